//! Provider entry point.

use std::sync::Arc;

use crate::document::DocumentService;
use crate::error::{PluginError, PluginResult};
use crate::events::EventService;
use crate::gateway::GatewayService;
use crate::queue::QueueService;
use crate::storage::StorageService;

/// Constructs the collaborators of one provider.
///
/// A provider that lacks a service leaves the default, which reports it
/// as unimplemented; the membrane then treats it as absent.
pub trait ServiceFactory: Send + Sync {
    fn new_document_service(&self) -> PluginResult<Arc<dyn DocumentService>> {
        Err(PluginError::unimplemented("ServiceFactory.NewDocumentService"))
    }

    fn new_event_service(&self) -> PluginResult<Arc<dyn EventService>> {
        Err(PluginError::unimplemented("ServiceFactory.NewEventService"))
    }

    fn new_gateway_service(&self) -> PluginResult<Arc<dyn GatewayService>> {
        Err(PluginError::unimplemented("ServiceFactory.NewGatewayService"))
    }

    fn new_queue_service(&self) -> PluginResult<Arc<dyn QueueService>> {
        Err(PluginError::unimplemented("ServiceFactory.NewQueueService"))
    }

    fn new_storage_service(&self) -> PluginResult<Arc<dyn StorageService>> {
        Err(PluginError::unimplemented("ServiceFactory.NewStorageService"))
    }
}
