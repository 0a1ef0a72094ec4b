//! In-memory event bus.

use std::collections::BTreeMap;

use async_trait::async_trait;
use membrane_plugins::{Code, EventService, NitricEvent, PluginError, PluginResult};
use parking_lot::Mutex;
use tracing::debug;

/// Event service that records every published event by topic.
///
/// Topics are created on first publish, or up front with
/// [`with_topics`](Self::with_topics).
#[derive(Debug, Default)]
pub struct DevEventService {
    topics: Mutex<BTreeMap<String, Vec<NitricEvent>>>,
}

impl DevEventService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: Mutex::new(
                topics
                    .into_iter()
                    .map(|t| (t.into(), Vec::new()))
                    .collect(),
            ),
        }
    }

    /// Events published to `topic` so far, oldest first.
    pub fn published(&self, topic: &str) -> Vec<NitricEvent> {
        self.topics.lock().get(topic).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl EventService for DevEventService {
    async fn publish(&self, topic: &str, event: &NitricEvent) -> PluginResult<()> {
        if topic.trim().is_empty() {
            return Err(PluginError::scoped("DevEvents.Publish", [("topic", topic)])
                .error(Code::InvalidArgument, "provide non-blank topic"));
        }

        debug!(topic, event_id = %event.id, "event published");
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_topics(&self) -> PluginResult<Vec<String>> {
        Ok(self.topics.lock().keys().cloned().collect())
    }
}
