//! Streaming listener.
//!
//! Every accepted TCP connection is handshaken into a [`FaasWorker`],
//! registered in the pool for as long as its stream lives, and unregistered
//! exactly once when the stream ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use membrane_core::{MembraneError, Worker, WorkerHandle};
use membrane_observability::lifecycle;
use membrane_pool::WorkerPool;
use membrane_protocol::{accept_worker, FaasWorker};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Settings for an [`RpcListener`].
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub handshake_timeout: Duration,
    pub quiet: bool,
}

/// Accept loop registering function streams as workers.
pub struct RpcListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcListener {
    /// Bind `address` and start accepting function streams.
    ///
    /// Fails with [`MembraneError::Listen`] if the address cannot be bound.
    pub async fn start(
        address: &str,
        pool: Arc<dyn WorkerPool>,
        options: ListenerOptions,
    ) -> Result<Self, MembraneError> {
        let listen_error = |source| MembraneError::Listen {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(listen_error)?;
        let local_addr = listener.local_addr().map_err(listen_error)?;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, pool, options, shutdown.clone()));

        Ok(Self {
            local_addr,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every registered stream and wait for their
    /// workers to be unregistered.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "listener task failed");
            }
        }
    }
}

impl std::fmt::Debug for RpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcListener")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    pool: Arc<dyn WorkerPool>,
    options: ListenerOptions,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        pool.clone(),
                        options.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(error = %e, "failed to accept function stream"),
            },
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
    debug!("listener stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pool: Arc<dyn WorkerPool>,
    options: ListenerOptions,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
    }
    let (reader, writer) = stream.into_split();

    let worker = tokio::select! {
        _ = shutdown.cancelled() => return,
        accepted = accept_worker(reader, writer, options.handshake_timeout) => match accepted {
            Ok(worker) => Arc::new(worker),
            Err(e) => {
                warn!(%peer, error = %e, "rejected function stream");
                return;
            }
        },
    };

    let handle: WorkerHandle = worker.clone();
    if let Err(e) = pool.add_worker(handle.clone()) {
        warn!(%peer, worker_id = %handle.id(), error = %e, "could not register worker");
        return;
    }
    lifecycle!(
        options.quiet,
        %peer,
        worker_id = %handle.id(),
        runtime = worker.runtime().unwrap_or("unknown"),
        "function connected"
    );

    let outcome = run_worker(worker, shutdown).await;

    pool.remove_worker(&handle);
    match outcome {
        Ok(()) => lifecycle!(
            options.quiet,
            %peer,
            worker_id = %handle.id(),
            "function disconnected"
        ),
        Err(e) => warn!(%peer, worker_id = %handle.id(), error = %e, "function stream failed"),
    }
}

/// Run the worker's listen loop until its stream ends or `shutdown` fires.
async fn run_worker(
    worker: Arc<FaasWorker>,
    shutdown: CancellationToken,
) -> Result<(), MembraneError> {
    let closer = {
        let worker = worker.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            worker.close();
        })
    };

    let (sink, outcome) = oneshot::channel();
    worker.listen(sink).await;
    closer.abort();

    outcome.await.unwrap_or(Ok(()))
}
