//! Event publishing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// Event published by a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NitricEvent {
    pub id: String,
    pub payload_type: String,
    pub payload: serde_json::Value,
}

/// Publish/subscribe backend.
#[async_trait]
pub trait EventService: Send + Sync {
    /// Publish `event` to `topic`.
    async fn publish(&self, _topic: &str, _event: &NitricEvent) -> PluginResult<()> {
        Err(PluginError::unimplemented("Events.Publish"))
    }

    /// Names of the available topics.
    async fn list_topics(&self) -> PluginResult<Vec<String>> {
        Err(PluginError::unimplemented("Events.ListTopics"))
    }
}
