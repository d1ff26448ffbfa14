//! Read side: the aggregate score and queue depths.

use std::sync::Arc;

use crate::error::Result;
use crate::model::{Aggregate, PipelineStatus, QueueName};
use crate::store::{DurableStore, TxMode};

/// Computes derived views from one read-only snapshot. Never mutates.
#[derive(Clone)]
pub struct AggregateReader {
    store: Arc<dyn DurableStore>,
}

impl AggregateReader {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Count and mean of every recorded score; `{0, 0}` when empty.
    pub async fn average(&self) -> Result<Aggregate> {
        let mut tx = self.store.begin(TxMode::ReadOnly).await?;
        let count = tx.count().await?;
        let aggregate = if count == 0 {
            Aggregate::default()
        } else {
            Aggregate::from_scores(tx.iterate().await?.into_iter().map(|(_, score)| score))
        };
        tx.commit().await?;
        Ok(aggregate)
    }

    pub async fn status(&self) -> Result<PipelineStatus> {
        let mut tx = self.store.begin(TxMode::ReadOnly).await?;
        let status = PipelineStatus {
            pending_topics: tx.queue_len(QueueName::Topics).await?,
            pending_tweets: tx.queue_len(QueueName::Tweets).await?,
            dead_topics: tx.queue_len(QueueName::DeadTopics).await?,
            dead_tweets: tx.queue_len(QueueName::DeadTweets).await?,
            scored_tweets: tx.count().await?,
        };
        tx.commit().await?;
        Ok(status)
    }
}
