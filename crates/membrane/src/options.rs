//! Membrane options and collaborator injection.

use std::sync::Arc;
use std::time::Duration;

use membrane_core::ConfigurationError;
use membrane_plugins::{
    DocumentService, EventService, GatewayService, QueueService, ServiceFactory, StorageService,
};
use membrane_pool::{ProcessPoolOptions, WorkerPool};
use membrane_protocol::DEFAULT_HANDSHAKE_TIMEOUT;
use tracing::warn;

use crate::config::{MembraneConfig, DEFAULT_SERVICE_ADDRESS};

/// Everything a [`Membrane`](crate::Membrane) is built from.
#[derive(Clone)]
pub struct MembraneOptions {
    pub service_address: String,
    pub child_command: Vec<String>,
    pub child_address: Option<String>,
    pub child_timeout: Duration,
    pub stop_timeout: Duration,
    pub handshake_timeout: Duration,
    pub tolerate_missing_services: bool,
    pub suppress_logs: bool,
    pub pool_options: ProcessPoolOptions,
    /// Pool to register workers in. A [`ProcessPool`](membrane_pool::ProcessPool)
    /// built from `pool_options` is used when unset.
    pub pool: Option<Arc<dyn WorkerPool>>,
    pub gateway: Option<Arc<dyn GatewayService>>,
    pub documents: Option<Arc<dyn DocumentService>>,
    pub events: Option<Arc<dyn EventService>>,
    pub queue: Option<Arc<dyn QueueService>>,
    pub storage: Option<Arc<dyn StorageService>>,
}

impl Default for MembraneOptions {
    fn default() -> Self {
        Self {
            service_address: DEFAULT_SERVICE_ADDRESS.to_string(),
            child_command: Vec::new(),
            child_address: None,
            child_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            tolerate_missing_services: false,
            suppress_logs: false,
            pool_options: ProcessPoolOptions::default(),
            pool: None,
            gateway: None,
            documents: None,
            events: None,
            queue: None,
            storage: None,
        }
    }
}

impl MembraneOptions {
    /// Default options with every collaborator taken from `factory`.
    pub fn from_factory(factory: &dyn ServiceFactory) -> Self {
        Self::default().with_factory(factory)
    }

    /// Options from file/environment settings, without collaborators.
    pub fn from_config(config: &MembraneConfig) -> Result<Self, ConfigurationError> {
        if config.min_workers == 0 {
            return Err(ConfigurationError::InvalidOption(
                "min_workers",
                "must be at least 1".to_string(),
            ));
        }
        if let Some(max) = config.max_workers {
            if max < config.min_workers {
                return Err(ConfigurationError::InvalidOption(
                    "max_workers",
                    format!("{} is below min_workers ({})", max, config.min_workers),
                ));
            }
        }

        Ok(Self {
            service_address: config.service_address.clone(),
            child_command: config.child_command.clone(),
            child_address: config.child_address.clone(),
            child_timeout: Duration::from_secs(config.child_timeout_secs),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
            tolerate_missing_services: config.tolerate_missing_services,
            suppress_logs: config.suppress_logs,
            pool_options: ProcessPoolOptions {
                min_workers: config.min_workers,
                max_workers: config.max_workers,
            },
            ..Self::default()
        })
    }

    /// Fill every collaborator from `factory`.
    ///
    /// A service the factory fails to build is left unset, so it counts as
    /// missing when the membrane is created.
    pub fn with_factory(mut self, factory: &dyn ServiceFactory) -> Self {
        self.gateway = built("gateway", factory.new_gateway_service());
        self.documents = built("documents", factory.new_document_service());
        self.events = built("events", factory.new_event_service());
        self.queue = built("queue", factory.new_queue_service());
        self.storage = built("storage", factory.new_storage_service());
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayService>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_service_address(mut self, address: impl Into<String>) -> Self {
        self.service_address = address.into();
        self
    }

    pub fn with_child_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_child_timeout(mut self, timeout: Duration) -> Self {
        self.child_timeout = timeout;
        self
    }

    pub fn tolerate_missing_services(mut self, tolerate: bool) -> Self {
        self.tolerate_missing_services = tolerate;
        self
    }

    pub fn suppress_logs(mut self, suppress: bool) -> Self {
        self.suppress_logs = suppress;
        self
    }

    /// Names of the optional collaborators that are unset.
    pub fn missing_services(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.documents.is_none() {
            missing.push("documents".to_string());
        }
        if self.events.is_none() {
            missing.push("events".to_string());
        }
        if self.queue.is_none() {
            missing.push("queue".to_string());
        }
        if self.storage.is_none() {
            missing.push("storage".to_string());
        }
        missing
    }
}

impl std::fmt::Debug for MembraneOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembraneOptions")
            .field("service_address", &self.service_address)
            .field("child_command", &self.child_command)
            .field("child_address", &self.child_address)
            .field("child_timeout", &self.child_timeout)
            .field("tolerate_missing_services", &self.tolerate_missing_services)
            .field("gateway", &self.gateway.is_some())
            .field("missing_services", &self.missing_services())
            .finish_non_exhaustive()
    }
}

fn built<T: ?Sized>(
    service: &str,
    result: membrane_plugins::PluginResult<Arc<T>>,
) -> Option<Arc<T>> {
    match result {
        Ok(built) => Some(built),
        Err(e) => {
            warn!(service, error = %e, "provider did not supply service");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use membrane_plugins::{PluginResult, ServiceFactory};

    use super::*;

    struct GatewayOnly;

    impl GatewayService for GatewayOnly {}

    impl ServiceFactory for GatewayOnly {
        fn new_gateway_service(&self) -> PluginResult<Arc<dyn GatewayService>> {
            Ok(Arc::new(GatewayOnly))
        }
    }

    #[test]
    fn test_factory_errors_leave_services_unset() {
        let options = MembraneOptions::from_factory(&GatewayOnly);

        assert!(options.gateway.is_some());
        assert_eq!(
            options.missing_services(),
            vec!["documents", "events", "queue", "storage"]
        );
    }

    #[test]
    fn test_from_config_rejects_inverted_bounds() {
        let config = MembraneConfig {
            min_workers: 2,
            max_workers: Some(1),
            ..MembraneConfig::default()
        };

        assert!(matches!(
            MembraneOptions::from_config(&config),
            Err(ConfigurationError::InvalidOption("max_workers", _))
        ));
    }

    #[test]
    fn test_from_config_copies_settings() {
        let config = MembraneConfig {
            service_address: ":9001".to_string(),
            child_timeout_secs: 3,
            tolerate_missing_services: true,
            ..MembraneConfig::default()
        };

        let options = MembraneOptions::from_config(&config).unwrap();
        assert_eq!(options.service_address, ":9001");
        assert_eq!(options.child_timeout, Duration::from_secs(3));
        assert!(options.tolerate_missing_services);
        assert!(options.gateway.is_none());
    }
}
