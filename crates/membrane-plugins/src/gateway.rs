//! Gateway capability.

use std::sync::Arc;

use async_trait::async_trait;
use membrane_core::MembraneError;
use membrane_pool::WorkerPool;

/// Turns a platform's inbound traffic into triggers.
///
/// `start` blocks for the gateway's lifetime, taking a worker from `pool`
/// for every inbound request and translating the result back into the
/// platform's reply. `stop` makes a running `start` return.
#[async_trait]
pub trait GatewayService: Send + Sync {
    async fn start(&self, _pool: Arc<dyn WorkerPool>) -> Result<(), MembraneError> {
        Err(MembraneError::Unimplemented("GatewayService::start"))
    }

    async fn stop(&self) -> Result<(), MembraneError> {
        Err(MembraneError::Unimplemented("GatewayService::stop"))
    }
}
