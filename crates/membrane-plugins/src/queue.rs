//! Task queues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Unit of work pushed to a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: String,
    pub payload_type: String,
    pub payload: serde_json::Value,
}

/// A received task, held under a lease until completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasedTask {
    pub lease_id: String,
    pub task: QueueTask,
}

/// A task a batch send could not enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task: QueueTask,
    pub message: String,
}

/// Outcome of [`QueueService::send_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendBatchResponse {
    pub failed_tasks: Vec<FailedTask>,
}

/// Queue backend.
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn send(&self, _queue: &str, _task: QueueTask) -> PluginResult<()> {
        Err(PluginError::unimplemented("Queue.Send"))
    }

    /// Send several tasks; per-task failures are reported, not raised.
    async fn send_batch(
        &self,
        _queue: &str,
        _tasks: Vec<QueueTask>,
    ) -> PluginResult<SendBatchResponse> {
        Err(PluginError::unimplemented("Queue.SendBatch"))
    }

    /// Lease up to `depth` tasks.
    async fn receive(&self, _queue: &str, _depth: usize) -> PluginResult<Vec<LeasedTask>> {
        Err(PluginError::unimplemented("Queue.Receive"))
    }

    /// Acknowledge a leased task, removing it from the queue.
    async fn complete(&self, _queue: &str, _lease_id: &str) -> PluginResult<()> {
        Err(PluginError::unimplemented("Queue.Complete"))
    }
}
