//! Local provider entry point.

use std::sync::Arc;

use membrane_plugins::{
    DocumentService, EventService, GatewayService, PluginResult, QueueService, ServiceFactory,
    StorageService,
};

use crate::document::DevDocumentService;
use crate::events::DevEventService;
use crate::gateway::DevGateway;
use crate::queue::DevQueueService;
use crate::storage::DevStorageService;

/// Address the local gateway listens on by default.
pub const DEFAULT_GATEWAY_ADDRESS: &str = "0.0.0.0:9001";

/// Builds the local provider's services.
#[derive(Debug, Clone)]
pub struct DevServiceFactory {
    gateway_address: String,
}

impl DevServiceFactory {
    pub fn new(gateway_address: impl Into<String>) -> Self {
        Self {
            gateway_address: gateway_address.into(),
        }
    }

    pub fn gateway_address(&self) -> &str {
        &self.gateway_address
    }
}

impl Default for DevServiceFactory {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY_ADDRESS)
    }
}

impl ServiceFactory for DevServiceFactory {
    fn new_document_service(&self) -> PluginResult<Arc<dyn DocumentService>> {
        Ok(Arc::new(DevDocumentService::new()))
    }

    fn new_event_service(&self) -> PluginResult<Arc<dyn EventService>> {
        Ok(Arc::new(DevEventService::new()))
    }

    fn new_gateway_service(&self) -> PluginResult<Arc<dyn GatewayService>> {
        Ok(Arc::new(DevGateway::new(self.gateway_address.clone())))
    }

    fn new_queue_service(&self) -> PluginResult<Arc<dyn QueueService>> {
        Ok(Arc::new(DevQueueService::new()))
    }

    fn new_storage_service(&self) -> PluginResult<Arc<dyn StorageService>> {
        Ok(Arc::new(DevStorageService::new()))
    }
}
