//! Child process supervisor.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use membrane_core::MembraneError;
use membrane_observability::lifecycle;
use membrane_pool::WorkerPool;
use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::state::{ChildState, ExitReason};

/// Environment variable carrying the address the child connects back to.
pub const SERVICE_ADDRESS_ENV: &str = "SERVICE_ADDRESS";

/// Settings for a [`ChildSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Command line of the function process. Empty when the function is
    /// managed externally.
    pub command: Vec<String>,
    /// Address the child is told to connect back to.
    pub service_address: String,
    /// How long to wait for the first worker to register.
    pub readiness_timeout: Duration,
    /// How long to wait for the child to exit after a termination signal.
    pub stop_timeout: Duration,
    /// Log lifecycle events at debug instead of info.
    pub quiet: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            service_address: "127.0.0.1:50051".to_string(),
            readiness_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(5),
            quiet: false,
        }
    }
}

/// Boots the function process and watches it for exit.
///
/// Readiness is observed through the worker pool: the child is ready once
/// it has connected back and registered a worker.
pub struct ChildSupervisor {
    options: SupervisorOptions,
    pool: Arc<dyn WorkerPool>,
    state: Arc<Mutex<ChildState>>,
    pid: Mutex<Option<u32>>,
    stopping: Arc<AtomicBool>,
    kill: CancellationToken,
    exited: Arc<watch::Sender<bool>>,
}

impl ChildSupervisor {
    pub fn new(options: SupervisorOptions, pool: Arc<dyn WorkerPool>) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            options,
            pool,
            state: Arc::new(Mutex::new(ChildState::default())),
            pid: Mutex::new(None),
            stopping: Arc::new(AtomicBool::new(false)),
            kill: CancellationToken::new(),
            exited: Arc::new(exited),
        }
    }

    /// Snapshot of the lifecycle state.
    pub fn state(&self) -> ChildState {
        self.state.lock().clone()
    }

    /// Whether a process has been spawned by this supervisor.
    pub fn manages_process(&self) -> bool {
        !self.options.command.is_empty()
    }

    /// Spawn the child (if configured) and wait for it to register a worker.
    ///
    /// Fails with [`MembraneError::ChildProcess`] if the command cannot be
    /// spawned or exits before registering, and with
    /// [`MembraneError::ChildStartupTimeout`] if nothing registers in time.
    pub async fn start(&self) -> Result<(), MembraneError> {
        let quiet = self.options.quiet;
        let spawned = if self.manages_process() {
            let child = self.spawn()?;
            let pid = child.id();
            *self.pid.lock() = pid;
            self.transition(|s| match s {
                ChildState::NotStarted(s) => ChildState::Starting(s.start(pid)),
                other => other,
            });
            lifecycle!(
                quiet,
                pid = ?pid,
                command = %self.options.command.join(" "),
                "function process started"
            );
            tokio::spawn(watch_exit(
                child,
                self.kill.clone(),
                self.state.clone(),
                self.stopping.clone(),
                self.exited.clone(),
            ));
            true
        } else {
            self.transition(|s| match s {
                ChildState::NotStarted(s) => ChildState::Starting(s.start(None)),
                other => other,
            });
            lifecycle!(
                quiet,
                address = %self.options.service_address,
                "waiting for an externally managed function"
            );
            false
        };

        let timeout = self.options.readiness_timeout;
        let exited = self.exited.subscribe();
        let outcome = tokio::select! {
            biased;
            ready = self.pool.wait_for_minimum_workers(timeout) => ready,
            _ = wait_exited(exited), if spawned => Err(MembraneError::ChildProcess(
                "function process exited before registering a worker".to_string(),
            )),
        };

        match outcome {
            Ok(()) => {
                self.transition(ChildState::into_ready);
                lifecycle!(quiet, "function is ready");
                Ok(())
            }
            Err(MembraneError::ChildStartupTimeout(t)) => {
                self.transition(|s| s.into_exited(ExitReason::StartupTimeout(t)));
                if spawned {
                    if let Err(e) = self.terminate().await {
                        warn!(error = %e, "failed to stop function process after startup timeout");
                    }
                }
                Err(MembraneError::ChildStartupTimeout(t))
            }
            Err(e) => Err(e),
        }
    }

    fn spawn(&self) -> Result<Child, MembraneError> {
        let (program, args) = match self.options.command.split_first() {
            Some(split) => split,
            None => {
                return Err(MembraneError::ChildProcess(
                    "no child command configured".to_string(),
                ));
            }
        };

        let spawned = Command::new(program)
            .args(args)
            .env(SERVICE_ADDRESS_ENV, &self.options.service_address)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        spawned.map_err(|e| {
            let reason = format!("failed to start `{}`: {}", self.options.command.join(" "), e);
            self.transition(|s| s.into_exited(ExitReason::SpawnFailed(reason.clone())));
            MembraneError::ChildProcess(reason)
        })
    }

    /// Terminate the child if one was spawned, waiting a bounded time for
    /// it to exit. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<(), MembraneError> {
        self.stopping.store(true, Ordering::SeqCst);
        if !self.manages_process() || *self.exited.borrow() {
            return Ok(());
        }
        self.terminate().await
    }

    async fn terminate(&self) -> Result<(), MembraneError> {
        let Some(pid) = *self.pid.lock() else {
            return Ok(());
        };
        self.stopping.store(true, Ordering::SeqCst);

        if !send_sigterm(pid) {
            self.kill.cancel();
        }

        let timeout = self.options.stop_timeout;
        if tokio::time::timeout(timeout, wait_exited(self.exited.subscribe()))
            .await
            .is_ok()
        {
            return Ok(());
        }

        warn!(pid, timeout = ?timeout, "function process ignored termination, killing it");
        self.kill.cancel();
        tokio::time::timeout(timeout, wait_exited(self.exited.subscribe()))
            .await
            .map_err(|_| {
                MembraneError::ChildProcess(format!("process {} did not exit after kill", pid))
            })
    }

    fn transition(&self, f: impl FnOnce(ChildState) -> ChildState) {
        transition(&self.state, f);
    }
}

impl std::fmt::Debug for ChildSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildSupervisor")
            .field("options", &self.options)
            .field("state", &self.state.lock().name())
            .finish_non_exhaustive()
    }
}

fn transition(state: &Mutex<ChildState>, f: impl FnOnce(ChildState) -> ChildState) {
    let mut state = state.lock();
    let current = std::mem::take(&mut *state);
    *state = f(current);
}

async fn wait_exited(mut exited: watch::Receiver<bool>) {
    while !*exited.borrow_and_update() {
        if exited.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Own the child until it exits, then record the exit.
async fn watch_exit(
    mut child: Child,
    kill: CancellationToken,
    state: Arc<Mutex<ChildState>>,
    stopping: Arc<AtomicBool>,
    exited: Arc<watch::Sender<bool>>,
) {
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "kill failed");
            }
            child.wait().await
        }
    };

    let code = status.as_ref().ok().and_then(|s| s.code());
    let stopped = stopping.load(Ordering::SeqCst);
    let reason = if stopped {
        ExitReason::Stopped
    } else {
        ExitReason::Terminated(code)
    };

    let was_ready = {
        let mut state = state.lock();
        let was_ready = state.is_ready();
        let current = std::mem::take(&mut *state);
        *state = current.into_exited(reason);
        was_ready
    };

    if stopped {
        debug!(code = ?code, "function process stopped");
    } else if was_ready {
        warn!(code = ?code, "function process exited unexpectedly");
    } else {
        debug!(code = ?code, "function process exited");
    }
    exited.send_replace(true);
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}
