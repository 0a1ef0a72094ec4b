//! Membrane CLI - Run a function behind the membrane on a local machine.
//!
//! ```text
//! membrane [OPTIONS] -- node index.js
//! ```
//!
//! The function process is started with `SERVICE_ADDRESS` pointing at the
//! membrane's listener; local HTTP traffic reaches it through the gateway.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use membrane::{Membrane, MembraneOptions};
use membrane_dev::DevServiceFactory;
use membrane_observability::{init_tracing, LogFormat};
use tracing::{error, info, warn};

use config::CliConfig;

/// Membrane - Sidecar runtime connecting triggers to a function process
#[derive(Parser)]
#[command(name = "membrane")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "MEMBRANE_CONFIG")]
    config: Option<PathBuf>,

    /// Address the function stream listener binds
    #[arg(long)]
    service_address: Option<String>,

    /// Seconds to wait for the function to register
    #[arg(long, value_name = "SECS")]
    child_timeout: Option<u64>,

    /// Keep running when optional services are missing or the function is late
    #[arg(long)]
    tolerate_missing_services: bool,

    /// Address the local HTTP gateway listens on
    #[arg(long)]
    gateway_address: Option<String>,

    /// Log output format (json, pretty, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Function command line
    #[arg(last = true, value_name = "CHILD_COMMAND")]
    child_command: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<CliConfig> {
        let mut config = match &self.config {
            Some(path) => CliConfig::load(path)?,
            None => CliConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;

        if let Some(address) = self.service_address {
            config.membrane.service_address = address;
        }
        if let Some(timeout) = self.child_timeout {
            config.membrane.child_timeout_secs = timeout;
        }
        if self.tolerate_missing_services {
            config.membrane.tolerate_missing_services = true;
        }
        if let Some(address) = self.gateway_address {
            config.gateway_address = address;
        }
        if let Some(format) = self.log_format {
            config.membrane.logging.format = format;
        }
        if !self.child_command.is_empty() {
            config.membrane.child_command = self.child_command;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    init_tracing(&config.membrane.logging)?;

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: CliConfig) -> Result<()> {
    let factory = DevServiceFactory::new(config.gateway_address.clone());
    let options = MembraneOptions::from_config(&config.membrane)
        .context("Invalid configuration")?
        .with_factory(&factory);
    let membrane = Arc::new(Membrane::new(options).context("Failed to create membrane")?);

    let stopper = membrane.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            if let Err(e) = stopper.stop().await {
                warn!(error = %e, "shutdown did not complete cleanly");
            }
        }
    });

    info!(gateway = %config.gateway_address, "starting membrane");
    membrane.start().await.context("Membrane failed")?;
    Ok(())
}
