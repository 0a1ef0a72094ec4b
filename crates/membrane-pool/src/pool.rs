//! Worker pool capability.

use std::time::Duration;

use async_trait::async_trait;
use membrane_core::{MembraneError, WorkerHandle};

/// Predicate used to narrow worker selection.
pub type WorkerFilter = dyn Fn(&WorkerHandle) -> bool + Send + Sync;

/// Registry of workers that triggers can be dispatched to.
///
/// Identity is reference-based: two handles are the same worker only if they
/// point at the same allocation.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Register a worker.
    ///
    /// Fails with [`MembraneError::DuplicateWorker`] if it is already present.
    fn add_worker(&self, worker: WorkerHandle) -> Result<(), MembraneError>;

    /// Unregister a worker. Returns whether it was present.
    fn remove_worker(&self, worker: &WorkerHandle) -> bool;

    /// Pick a worker without waiting.
    ///
    /// Fails with [`MembraneError::NoWorkersAvailable`] when no registered
    /// worker matches.
    fn get_worker(&self, filter: Option<&WorkerFilter>) -> Result<WorkerHandle, MembraneError>;

    /// Number of registered workers.
    fn worker_count(&self) -> usize;

    /// Wait until the pool holds its minimum number of workers.
    async fn wait_for_minimum_workers(&self, timeout: Duration) -> Result<(), MembraneError>;
}
