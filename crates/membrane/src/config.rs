//! Serializable membrane settings.

use std::net::SocketAddr;

use membrane_observability::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Default address the streaming listener binds.
pub const DEFAULT_SERVICE_ADDRESS: &str = "127.0.0.1:50051";

/// Membrane settings as read from a config file and the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembraneConfig {
    /// Address the streaming listener binds. `:port` binds all interfaces.
    pub service_address: String,
    /// Function process command line. Empty when the function is managed
    /// externally.
    pub child_command: Vec<String>,
    /// Address the function is told to connect to, when it differs from
    /// the bound address.
    pub child_address: Option<String>,
    /// Seconds to wait for the function to register.
    pub child_timeout_secs: u64,
    /// Continue startup when optional services are missing or the function
    /// does not register in time.
    pub tolerate_missing_services: bool,
    /// Log lifecycle events at debug instead of info.
    pub suppress_logs: bool,
    /// Workers required before the function counts as ready.
    pub min_workers: usize,
    /// Upper bound on concurrently registered workers.
    pub max_workers: Option<usize>,
    /// Seconds to wait for the function to exit on shutdown.
    pub stop_timeout_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for MembraneConfig {
    fn default() -> Self {
        Self {
            service_address: DEFAULT_SERVICE_ADDRESS.to_string(),
            child_command: Vec::new(),
            child_address: None,
            child_timeout_secs: 10,
            tolerate_missing_services: false,
            suppress_logs: false,
            min_workers: 1,
            max_workers: None,
            stop_timeout_secs: 5,
            logging: LoggingConfig::default(),
        }
    }
}

/// Expand a `:port` bind address to all interfaces.
pub fn normalize_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

/// Address a local function should connect to for a listener bound at
/// `bound`.
pub fn advertised_address(bound: SocketAddr) -> String {
    if bound.ip().is_unspecified() {
        let loopback = match bound {
            SocketAddr::V4(_) => "127.0.0.1",
            SocketAddr::V6(_) => "[::1]",
        };
        format!("{}:{}", loopback, bound.port())
    } else {
        bound.to_string()
    }
}
