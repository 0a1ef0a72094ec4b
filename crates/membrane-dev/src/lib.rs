//! Local development provider.
//!
//! Runs a function on a developer machine without any cloud backend:
//! - `DevGateway` - HTTP gateway turning local requests into triggers
//! - `DevDocumentService` / `DevEventService` / `DevQueueService` /
//!   `DevStorageService` - In-memory backends
//! - `DevServiceFactory` - Provider entry point

mod document;
mod events;
mod factory;
mod gateway;
mod queue;
mod storage;

pub use document::*;
pub use events::*;
pub use factory::*;
pub use gateway::*;
pub use queue::*;
pub use storage::*;
