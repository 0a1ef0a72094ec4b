//! Sidecar runtime connecting platform triggers to a function process.
//!
//! This crate is the composition root:
//! - `MembraneConfig` - Serializable settings loaded by the binary
//! - `MembraneOptions` - Settings plus the injected plugin collaborators
//! - `RpcListener` - Accepts function streams and registers them as workers
//! - `Membrane` - Validates collaborators, starts and stops every component
//!
//! The building blocks are re-exported so providers and binaries need a
//! single dependency.

mod config;
mod listener;
mod membrane;
mod options;

pub use config::*;
pub use listener::*;
pub use membrane::*;
pub use options::*;

pub use membrane_core::{
    ConfigurationError, Event, HttpRequest, HttpResponse, MembraneError, Trigger, Worker,
    WorkerHandle, WorkerId,
};
pub use membrane_plugins as plugins;
pub use membrane_pool::{ProcessPool, ProcessPoolOptions, WorkerPool};
pub use membrane_protocol as protocol;
