//! Worker capability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MembraneError;
use crate::trigger::{Event, HttpRequest, HttpResponse, Trigger};

/// Identifier for a worker, used for logging.
///
/// Pool membership is decided by handle identity, not by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Allocate a new process-unique worker ID.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

/// Result of dispatching a [`Trigger`] to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Reply to an HTTP-shaped trigger.
    Http(HttpResponse),
    /// An event was acknowledged.
    EventAcknowledged,
}

/// Something that can execute a trigger against a connected function.
///
/// Implementations that do not support a trigger kind keep the default
/// method, which returns [`MembraneError::Unimplemented`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker ID for logging.
    fn id(&self) -> WorkerId;

    /// Execute an HTTP-shaped trigger and return the function's reply.
    async fn handle_http_request(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, MembraneError> {
        let _ = request;
        Err(MembraneError::Unimplemented("http request handling"))
    }

    /// Deliver an event and wait for the function's acknowledgement.
    async fn handle_event(&self, event: Event) -> Result<(), MembraneError> {
        let _ = event;
        Err(MembraneError::Unimplemented("event handling"))
    }

    /// Dispatch any trigger to the matching handler.
    async fn handle_trigger(&self, trigger: Trigger) -> Result<TriggerOutcome, MembraneError> {
        match trigger {
            Trigger::Http(request) => self
                .handle_http_request(request)
                .await
                .map(TriggerOutcome::Http),
            Trigger::Event(event) => self
                .handle_event(event)
                .await
                .map(|_| TriggerOutcome::EventAcknowledged),
        }
    }
}

/// Shared handle to a worker, as stored in a pool.
pub type WorkerHandle = Arc<dyn Worker>;

/// Whether two handles refer to the same worker instance.
pub fn same_worker(a: &WorkerHandle, b: &WorkerHandle) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
