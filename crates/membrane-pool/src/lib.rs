//! Worker registry.
//!
//! This crate tracks the workers a membrane can dispatch to:
//! - `WorkerPool` - Registry capability consumed by gateways and the listener
//! - `ProcessPool` - Default pool backed by connected function processes

mod pool;
mod process;

pub use pool::*;
pub use process::*;
