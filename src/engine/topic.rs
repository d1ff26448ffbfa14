//! Topic changes.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{QueueName, Topic};
use crate::store::{DurableStore, TxMode};
use crate::telemetry::metrics;

/// Result of a topic-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicChange {
    /// Blank subject; nothing was touched.
    Ignored,
    /// The new topic is queued. `drained` stale topic entries were removed.
    Set { drained: u64 },
}

impl TopicChange {
    pub fn accepted(self) -> bool {
        matches!(self, TopicChange::Set { .. })
    }
}

/// Replaces the active topic and resets the aggregate in one transaction.
#[derive(Clone)]
pub struct TopicController {
    store: Arc<dyn DurableStore>,
}

impl TopicController {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Clear the score map, drain the topic queue and queue `subject`.
    ///
    /// Readers see either the old topic with its scores or the new topic
    /// with an empty map. Not retried on abort; the caller re-issues.
    pub async fn set_topic(&self, subject: &str) -> Result<TopicChange> {
        let Some(topic) = Topic::parse(subject) else {
            debug!("ignoring blank topic");
            metrics::topic_changes().add(1, &[KeyValue::new("result", "ignored")]);
            return Ok(TopicChange::Ignored);
        };

        let mut tx = self.store.begin(TxMode::ReadWrite).await?;
        tx.clear().await?;
        let drained = tx.drain(QueueName::Topics).await?;
        tx.enqueue(QueueName::Topics, topic.as_str()).await?;
        tx.commit().await?;

        metrics::topic_changes().add(1, &[KeyValue::new("result", "set")]);
        info!(topic = %topic, drained, "topic changed");
        Ok(TopicChange::Set { drained })
    }
}
