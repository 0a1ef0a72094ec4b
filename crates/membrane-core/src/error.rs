//! Error taxonomy for the membrane runtime.

use std::time::Duration;

/// Errors raised while validating membrane configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing gateway plugin, the membrane cannot receive triggers without one")]
    MissingGatewayPlugin,

    #[error("Missing services: [{}]", .0.join(", "))]
    MissingServices(Vec<String>),

    #[error("Invalid option '{0}': {1}")]
    InvalidOption(&'static str, String),
}

/// Error type for membrane and worker operations.
#[derive(Debug, thiserror::Error)]
pub enum MembraneError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Could not listen on {address}: {source}")]
    Listen {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Child process did not register a worker within {0:?}")]
    ChildStartupTimeout(Duration),

    #[error("Child process error: {0}")]
    ChildProcess(String),

    #[error("No workers available in the pool")]
    NoWorkersAvailable,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Worker is already registered in the pool")]
    DuplicateWorker,

    #[error("Worker pool is full ({0} workers)")]
    MaxWorkersReached(usize),

    #[error("Worker is busy with another trigger")]
    WorkerBusy,

    #[error("Trigger of {size} bytes exceeds the {limit} byte frame limit")]
    TriggerTooLarge { size: usize, limit: usize },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(&'static str),

    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl MembraneError {
    /// Whether this error is fatal to `Membrane::start` even when missing
    /// services are tolerated.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::Listen { .. } | Self::ChildProcess(_) | Self::Configuration(_)
        )
    }

    /// Whether a gateway should report this error as temporary unavailability
    /// rather than an internal failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NoWorkersAvailable | Self::WorkerBusy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_error_message() {
        let err = MembraneError::Listen {
            address: "localhost:9005".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };

        assert!(err.to_string().contains("Could not listen"));
        assert!(err.to_string().contains("localhost:9005"));
    }

    #[test]
    fn test_missing_services_lists_each_service() {
        let err = ConfigurationError::MissingServices(vec![
            "document".to_string(),
            "queue".to_string(),
        ]);

        assert_eq!(err.to_string(), "Missing services: [document, queue]");
    }

    #[test]
    fn test_error_classification() {
        assert!(MembraneError::ChildProcess("spawn failed".into()).is_always_fatal());
        assert!(!MembraneError::ChildStartupTimeout(Duration::from_secs(1)).is_always_fatal());
        assert!(MembraneError::NoWorkersAvailable.is_unavailable());
        assert!(!MembraneError::Stream("closed".into()).is_unavailable());
        assert!(!MembraneError::TriggerTooLarge { size: 2, limit: 1 }.is_unavailable());
    }
}
