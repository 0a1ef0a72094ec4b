//! Plugin collaborator capabilities.
//!
//! The membrane never implements these itself; a provider constructs them
//! and injects them into the membrane options:
//! - `GatewayService` - Turns platform input into triggers (mandatory)
//! - `DocumentService` / `EventService` / `QueueService` / `StorageService` - Optional backends
//! - `ServiceFactory` - Provider entry point constructing all of the above
//! - `PluginError` - Coded, scoped error returned by every backend
//!
//! Every method has a default returning an `Unimplemented` error, so a
//! provider only implements the operations it supports.

mod document;
mod error;
mod events;
mod factory;
mod gateway;
mod queue;
mod storage;

pub use document::*;
pub use error::*;
pub use events::*;
pub use factory::*;
pub use gateway::*;
pub use queue::*;
pub use storage::*;
