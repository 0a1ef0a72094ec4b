//! Composition root.

use std::net::SocketAddr;
use std::sync::Arc;

use membrane_core::{ConfigurationError, MembraneError};
use membrane_observability::lifecycle;
use membrane_plugins::{DocumentService, EventService, GatewayService, QueueService, StorageService};
use membrane_pool::{ProcessPool, WorkerPool};
use membrane_supervisor::{ChildState, ChildSupervisor, SupervisorOptions};
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::{advertised_address, normalize_address};
use crate::listener::{ListenerOptions, RpcListener};
use crate::options::MembraneOptions;

/// The sidecar runtime.
///
/// Owns the worker pool, the streaming listener, the function process
/// supervisor and the injected collaborators, and wires their lifecycles
/// together.
pub struct Membrane {
    options: MembraneOptions,
    pool: Arc<dyn WorkerPool>,
    gateway: Arc<dyn GatewayService>,
    listener: Mutex<Option<Arc<RpcListener>>>,
    supervisor: Mutex<Option<Arc<ChildSupervisor>>>,
}

impl Membrane {
    /// Validate the collaborators and build a membrane.
    ///
    /// The gateway is always required. Missing optional services fail
    /// creation unless `tolerate_missing_services` is set.
    pub fn new(mut options: MembraneOptions) -> Result<Self, MembraneError> {
        let Some(gateway) = options.gateway.clone() else {
            return Err(ConfigurationError::MissingGatewayPlugin.into());
        };

        let missing = options.missing_services();
        if !missing.is_empty() {
            if !options.tolerate_missing_services {
                return Err(ConfigurationError::MissingServices(missing).into());
            }
            lifecycle!(
                options.suppress_logs,
                missing = %missing.join(", "),
                "continuing without services"
            );
        }

        let pool = match options.pool.take() {
            Some(pool) => pool,
            None => Arc::new(ProcessPool::new(options.pool_options.clone())),
        };

        Ok(Self {
            options,
            pool,
            gateway,
            listener: Mutex::new(None),
            supervisor: Mutex::new(None),
        })
    }

    /// Pool the function's workers register in.
    pub fn pool(&self) -> Arc<dyn WorkerPool> {
        self.pool.clone()
    }

    pub fn options(&self) -> &MembraneOptions {
        &self.options
    }

    pub fn documents(&self) -> Option<&Arc<dyn DocumentService>> {
        self.options.documents.as_ref()
    }

    pub fn events(&self) -> Option<&Arc<dyn EventService>> {
        self.options.events.as_ref()
    }

    pub fn queue(&self) -> Option<&Arc<dyn QueueService>> {
        self.options.queue.as_ref()
    }

    pub fn storage(&self) -> Option<&Arc<dyn StorageService>> {
        self.options.storage.as_ref()
    }

    /// Address the streaming listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|l| l.local_addr())
    }

    /// Lifecycle state of the function process, once started.
    pub fn child_state(&self) -> Option<ChildState> {
        self.supervisor.lock().as_ref().map(|s| s.state())
    }

    /// Bind the listener, boot the function and run the gateway.
    ///
    /// Returns when the gateway returns, or as soon as a fatal startup
    /// error occurs.
    pub async fn start(&self) -> Result<(), MembraneError> {
        let quiet = self.options.suppress_logs;
        let address = normalize_address(&self.options.service_address);

        let listener = Arc::new(
            RpcListener::start(
                &address,
                self.pool.clone(),
                ListenerOptions {
                    handshake_timeout: self.options.handshake_timeout,
                    quiet,
                },
            )
            .await?,
        );
        let local_addr = listener.local_addr();
        *self.listener.lock() = Some(listener);
        lifecycle!(quiet, address = %local_addr, "listening for function streams");

        let child_address = self
            .options
            .child_address
            .clone()
            .unwrap_or_else(|| advertised_address(local_addr));
        let supervisor = Arc::new(ChildSupervisor::new(
            SupervisorOptions {
                command: self.options.child_command.clone(),
                service_address: child_address,
                readiness_timeout: self.options.child_timeout,
                stop_timeout: self.options.stop_timeout,
                quiet,
            },
            self.pool.clone(),
        ));
        *self.supervisor.lock() = Some(supervisor.clone());

        if let Err(e) = supervisor.start().await {
            self.degrade_or_fail(e).await?;
        }

        lifecycle!(quiet, "starting gateway");
        self.gateway.start(self.pool.clone()).await
    }

    /// Continue in a degraded state when the error is tolerated; otherwise
    /// release what was started and fail.
    async fn degrade_or_fail(&self, err: MembraneError) -> Result<(), MembraneError> {
        if self.options.tolerate_missing_services && !err.is_always_fatal() {
            warn!(error = %err, "function not ready, continuing without it");
            return Ok(());
        }

        error!(error = %err, "membrane failed to start");
        self.stop_supervisor().await.ok();
        self.stop_listener().await;
        Err(err)
    }

    /// Stop the gateway, the function process and the listener.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    pub async fn stop(&self) -> Result<(), MembraneError> {
        let mut first = None;

        if let Err(e) = self.gateway.stop().await {
            warn!(error = %e, "failed to stop gateway");
            first.get_or_insert(e);
        }
        if let Err(e) = self.stop_supervisor().await {
            warn!(error = %e, "failed to stop function process");
            first.get_or_insert(e);
        }
        self.stop_listener().await;

        lifecycle!(self.options.suppress_logs, "membrane stopped");
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn stop_supervisor(&self) -> Result<(), MembraneError> {
        let supervisor = self.supervisor.lock().clone();
        match supervisor {
            Some(supervisor) => supervisor.stop().await,
            None => Ok(()),
        }
    }

    async fn stop_listener(&self) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Membrane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membrane")
            .field("options", &self.options)
            .field("workers", &self.pool.worker_count())
            .finish_non_exhaustive()
    }
}
