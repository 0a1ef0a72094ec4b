//! Logging setup for the membrane runtime.
//!
//! This crate provides:
//! - `LoggingConfig` / `LogFormat` - Subscriber settings, loadable from TOML
//! - `init_tracing` - Global `tracing` subscriber installation
//! - `lifecycle!` - Lifecycle log that drops to debug when logs are suppressed

mod config;
mod setup;

pub use config::*;
pub use setup::*;

#[doc(hidden)]
pub use tracing;

/// Log a lifecycle event at info, or at debug when `$quiet` is true.
///
/// ```ignore
/// lifecycle!(options.suppress_logs, address = %addr, "listening");
/// ```
#[macro_export]
macro_rules! lifecycle {
    ($quiet:expr, $($arg:tt)+) => {
        if $quiet {
            $crate::tracing::debug!($($arg)+)
        } else {
            $crate::tracing::info!($($arg)+)
        }
    };
}
