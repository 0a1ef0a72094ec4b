//! CLI configuration.
//!
//! Settings are layered: defaults, then the TOML file, then the
//! environment, then command line flags.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use membrane::MembraneConfig;
use membrane_dev::DEFAULT_GATEWAY_ADDRESS;
use membrane_observability::LogFormat;
use serde::{Deserialize, Serialize};

/// Everything the `membrane` binary reads from its config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub membrane: MembraneConfig,
    /// Address the local HTTP gateway listens on.
    pub gateway_address: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            membrane: MembraneConfig::default(),
            gateway_address: DEFAULT_GATEWAY_ADDRESS.to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("SERVICE_ADDRESS") {
            self.membrane.service_address = address;
        }
        if let Some(address) = lookup("CHILD_ADDRESS") {
            self.membrane.child_address = Some(address);
        }
        if let Some(timeout) = lookup("CHILD_TIMEOUT") {
            self.membrane.child_timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| {
                    format!("CHILD_TIMEOUT must be whole seconds, got '{}'", timeout)
                })?;
        }
        if let Some(tolerate) = lookup("TOLERATE_MISSING_SERVICES") {
            self.membrane.tolerate_missing_services =
                parse_bool("TOLERATE_MISSING_SERVICES", &tolerate)?;
        }
        if let Some(format) = lookup("MEMBRANE_LOG_FORMAT") {
            self.membrane.logging.format = LogFormat::from_str(&format)
                .map_err(anyhow::Error::msg)
                .context("Invalid MEMBRANE_LOG_FORMAT")?;
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", name, other),
    }
}
