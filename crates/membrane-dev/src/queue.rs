//! In-memory task queues.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use membrane_plugins::{
    Code, FailedTask, LeasedTask, PluginError, PluginResult, QueueService, QueueTask,
    SendBatchResponse,
};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Queue {
    pending: VecDeque<QueueTask>,
    leased: HashMap<String, QueueTask>,
}

/// Queue service kept in process memory.
///
/// Received tasks stay leased until completed. Leases never expire.
#[derive(Debug, Default)]
pub struct DevQueueService {
    queues: Mutex<HashMap<String, Queue>>,
    next_lease: AtomicU64,
}

impl DevQueueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks waiting to be received on `queue`.
    pub fn pending(&self, queue: &str) -> usize {
        self.queues.lock().get(queue).map_or(0, |q| q.pending.len())
    }

    fn lease_id(&self) -> String {
        format!("lease-{}", self.next_lease.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

fn validate(queue: &str, task: &QueueTask) -> Result<(), String> {
    if queue.is_empty() {
        return Err("provide non-blank queue".to_string());
    }
    if task.id.is_empty() {
        return Err("provide non-blank task id".to_string());
    }
    Ok(())
}

#[async_trait]
impl QueueService for DevQueueService {
    async fn send(&self, queue: &str, task: QueueTask) -> PluginResult<()> {
        if let Err(message) = validate(queue, &task) {
            return Err(PluginError::scoped("DevQueue.Send", [("queue", queue)])
                .error(Code::InvalidArgument, message));
        }
        self.queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .pending
            .push_back(task);
        Ok(())
    }

    async fn send_batch(
        &self,
        queue: &str,
        tasks: Vec<QueueTask>,
    ) -> PluginResult<SendBatchResponse> {
        if queue.is_empty() {
            return Err(PluginError::scoped("DevQueue.SendBatch", [("queue", queue)])
                .error(Code::InvalidArgument, "provide non-blank queue"));
        }

        let mut response = SendBatchResponse::default();
        let mut queues = self.queues.lock();
        let target = queues.entry(queue.to_string()).or_default();
        for task in tasks {
            match validate(queue, &task) {
                Ok(()) => target.pending.push_back(task),
                Err(message) => response.failed_tasks.push(FailedTask { task, message }),
            }
        }
        Ok(response)
    }

    async fn receive(&self, queue: &str, depth: usize) -> PluginResult<Vec<LeasedTask>> {
        let scope = PluginError::scoped("DevQueue.Receive", [("queue", queue)]);
        if queue.is_empty() {
            return Err(scope.error(Code::InvalidArgument, "provide non-blank queue"));
        }
        if depth == 0 {
            return Err(scope.error(Code::InvalidArgument, "depth must be at least 1"));
        }

        let mut queues = self.queues.lock();
        let Some(target) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let count = depth.min(target.pending.len());
        let mut leased = Vec::with_capacity(count);
        for task in target.pending.drain(..count) {
            let lease_id = self.lease_id();
            target.leased.insert(lease_id.clone(), task.clone());
            leased.push(LeasedTask { lease_id, task });
        }
        Ok(leased)
    }

    async fn complete(&self, queue: &str, lease_id: &str) -> PluginResult<()> {
        let removed = self
            .queues
            .lock()
            .get_mut(queue)
            .and_then(|q| q.leased.remove(lease_id));

        match removed {
            Some(_) => Ok(()),
            None => Err(
                PluginError::scoped("DevQueue.Complete", [("queue", queue), ("lease_id", lease_id)])
                    .error(Code::NotFound, "no task holds this lease"),
            ),
        }
    }
}
