//! Pool of workers backed by function processes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use membrane_core::{same_worker, MembraneError, WorkerHandle};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::pool::{WorkerFilter, WorkerPool};

/// Sizing options for a [`ProcessPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPoolOptions {
    /// Workers required before the pool counts as ready.
    pub min_workers: usize,
    /// Upper bound on registered workers, if any.
    pub max_workers: Option<usize>,
}

impl Default for ProcessPoolOptions {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: None,
        }
    }
}

/// Default [`WorkerPool`].
///
/// All mutation happens under one lock, so `get_worker` never observes a
/// half-registered worker. Selection returns the only worker directly and
/// round-robins otherwise.
pub struct ProcessPool {
    options: ProcessPoolOptions,
    workers: Mutex<Vec<WorkerHandle>>,
    cursor: AtomicUsize,
    count: watch::Sender<usize>,
}

impl ProcessPool {
    /// Create an empty pool.
    pub fn new(options: ProcessPoolOptions) -> Self {
        let (count, _) = watch::channel(0);
        Self {
            options,
            workers: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            count,
        }
    }

    /// Sizing options.
    pub fn options(&self) -> &ProcessPoolOptions {
        &self.options
    }

    /// Snapshot of the registered workers.
    pub fn workers(&self) -> Vec<WorkerHandle> {
        self.workers.lock().clone()
    }
}

impl Default for ProcessPool {
    fn default() -> Self {
        Self::new(ProcessPoolOptions::default())
    }
}

impl std::fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool")
            .field("options", &self.options)
            .field("workers", &self.worker_count())
            .finish()
    }
}

#[async_trait]
impl WorkerPool for ProcessPool {
    fn add_worker(&self, worker: WorkerHandle) -> Result<(), MembraneError> {
        let mut workers = self.workers.lock();
        if workers.iter().any(|w| same_worker(w, &worker)) {
            return Err(MembraneError::DuplicateWorker);
        }
        if let Some(max) = self.options.max_workers {
            if workers.len() >= max {
                return Err(MembraneError::MaxWorkersReached(max));
            }
        }

        debug!(worker_id = %worker.id(), count = workers.len() + 1, "worker registered");
        workers.push(worker);
        self.count.send_replace(workers.len());
        Ok(())
    }

    fn remove_worker(&self, worker: &WorkerHandle) -> bool {
        let mut workers = self.workers.lock();
        let before = workers.len();
        workers.retain(|w| !same_worker(w, worker));
        let removed = workers.len() != before;

        if removed {
            debug!(worker_id = %worker.id(), count = workers.len(), "worker unregistered");
            self.count.send_replace(workers.len());
        }
        removed
    }

    fn get_worker(&self, filter: Option<&WorkerFilter>) -> Result<WorkerHandle, MembraneError> {
        let workers = self.workers.lock();
        let candidates: Vec<&WorkerHandle> = match filter {
            Some(filter) => workers.iter().filter(|w| filter(*w)).collect(),
            None => workers.iter().collect(),
        };

        match candidates.len() {
            0 => Err(MembraneError::NoWorkersAvailable),
            1 => Ok(candidates[0].clone()),
            n => {
                let next = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
                Ok(candidates[next].clone())
            }
        }
    }

    fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    async fn wait_for_minimum_workers(&self, timeout: Duration) -> Result<(), MembraneError> {
        let min = self.options.min_workers;
        let mut count = self.count.subscribe();
        let reached = async {
            loop {
                if *count.borrow_and_update() >= min {
                    return Ok::<(), watch::error::RecvError>(());
                }
                count.changed().await?;
            }
        };

        match tokio::time::timeout(timeout, reached).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(MembraneError::ChildStartupTimeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use membrane_core::{Worker, WorkerId};

    use super::*;

    struct MockWorker {
        id: WorkerId,
    }

    #[async_trait]
    impl Worker for MockWorker {
        fn id(&self) -> WorkerId {
            self.id
        }
    }

    fn worker() -> WorkerHandle {
        Arc::new(MockWorker {
            id: WorkerId::next(),
        })
    }

    // === Registration ===

    #[test]
    fn test_single_worker_is_returned_until_removed() {
        let pool = ProcessPool::default();
        let only = worker();
        pool.add_worker(only.clone()).unwrap();

        for _ in 0..5 {
            assert!(same_worker(&pool.get_worker(None).unwrap(), &only));
        }

        assert!(pool.remove_worker(&only));
        assert!(matches!(
            pool.get_worker(None),
            Err(MembraneError::NoWorkersAvailable)
        ));
    }

    #[test]
    fn test_duplicate_worker_is_rejected() {
        let pool = ProcessPool::default();
        let w = worker();
        pool.add_worker(w.clone()).unwrap();

        assert!(matches!(
            pool.add_worker(w.clone()),
            Err(MembraneError::DuplicateWorker)
        ));
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let pool = ProcessPool::default();
        let w = worker();
        pool.add_worker(w.clone()).unwrap();

        assert!(pool.remove_worker(&w));
        assert!(!pool.remove_worker(&w));
        assert!(!pool.remove_worker(&worker()));
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn test_empty_pool_has_no_workers() {
        let pool = ProcessPool::default();
        assert!(matches!(
            pool.get_worker(None),
            Err(MembraneError::NoWorkersAvailable)
        ));
    }

    #[test]
    fn test_add_remove_sequence_keeps_identities_unique() {
        let pool = ProcessPool::default();
        let all: Vec<WorkerHandle> = (0..4).map(|_| worker()).collect();

        for step in 0..40 {
            let w = &all[(step * 7) % all.len()];
            if step % 3 == 0 {
                pool.remove_worker(w);
            } else {
                let _ = pool.add_worker(w.clone());
            }

            let registered = pool.workers();
            for (i, a) in registered.iter().enumerate() {
                for b in &registered[i + 1..] {
                    assert!(!same_worker(a, b));
                }
            }
            if let Ok(picked) = pool.get_worker(None) {
                assert!(registered.iter().any(|r| same_worker(r, &picked)));
            }
        }
    }

    #[test]
    fn test_max_workers_is_enforced() {
        let pool = ProcessPool::new(ProcessPoolOptions {
            min_workers: 1,
            max_workers: Some(1),
        });
        pool.add_worker(worker()).unwrap();

        assert!(matches!(
            pool.add_worker(worker()),
            Err(MembraneError::MaxWorkersReached(1))
        ));
    }

    // === Selection ===

    #[test]
    fn test_round_robin_across_workers() {
        let pool = ProcessPool::default();
        let a = worker();
        let b = worker();
        pool.add_worker(a.clone()).unwrap();
        pool.add_worker(b.clone()).unwrap();

        let first = pool.get_worker(None).unwrap();
        let second = pool.get_worker(None).unwrap();
        let third = pool.get_worker(None).unwrap();

        assert!(!same_worker(&first, &second));
        assert!(same_worker(&first, &third));
    }

    #[test]
    fn test_filter_narrows_selection() {
        let pool = ProcessPool::default();
        let a = worker();
        let b = worker();
        pool.add_worker(a).unwrap();
        pool.add_worker(b.clone()).unwrap();

        let b_id = b.id();
        let only_b: &WorkerFilter = &move |w: &WorkerHandle| w.id() == b_id;
        for _ in 0..3 {
            assert!(same_worker(&pool.get_worker(Some(only_b)).unwrap(), &b));
        }

        let none: &WorkerFilter = &|_: &WorkerHandle| false;
        assert!(matches!(
            pool.get_worker(Some(none)),
            Err(MembraneError::NoWorkersAvailable)
        ));
    }

    // === Readiness ===

    #[tokio::test]
    async fn test_wait_for_minimum_workers_resolves_on_registration() {
        let pool = Arc::new(ProcessPool::default());
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.wait_for_minimum_workers(Duration::from_secs(5)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.add_worker(worker()).unwrap();

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_minimum_workers_times_out() {
        let pool = ProcessPool::default();

        let err = pool
            .wait_for_minimum_workers(Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, MembraneError::ChildStartupTimeout(_)));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_ready() {
        let pool = ProcessPool::default();
        pool.add_worker(worker()).unwrap();

        pool.wait_for_minimum_workers(Duration::from_millis(1))
            .await
            .unwrap();
    }
}
