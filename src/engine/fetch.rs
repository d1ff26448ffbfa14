//! Fetch worker: turns the pending topic into queued tweet texts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{info, warn};

use super::PipelineConfig;
use super::retry::{AttemptTracker, RetryPolicy};
use super::worker::{Progress, Worker};
use crate::error::Result;
use crate::model::{QueueName, Topic};
use crate::search::TweetSearch;
use crate::store::{DurableStore, Transaction, TxMode};
use crate::telemetry::metrics;

/// Consumes the topic queue and feeds the tweet queue.
///
/// Dequeue, search and enqueue share one transaction: a search failure
/// rolls back the dequeue so the topic is retried, and a concurrent topic
/// change cannot interleave with a half-finished fetch.
pub struct FetchWorker {
    store: Arc<dyn DurableStore>,
    search: Arc<dyn TweetSearch>,
    config: PipelineConfig,
    attempts: AttemptTracker,
}

impl FetchWorker {
    pub fn new(
        store: Arc<dyn DurableStore>,
        search: Arc<dyn TweetSearch>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            search,
            config,
            attempts: AttemptTracker::default(),
        }
    }

    /// Run one fetch iteration. Returns whether a topic was consumed.
    pub async fn fetch_once(&mut self) -> Result<bool> {
        Ok(self.step().await? == Progress::Worked)
    }

    async fn dead_letter(&mut self, mut tx: Box<dyn Transaction>, raw: &str) -> Result<()> {
        tx.enqueue(QueueName::DeadTopics, raw).await?;
        tx.commit().await?;
        self.attempts.reset();
        metrics::items_dead_lettered()
            .add(1, &[KeyValue::new("queue", QueueName::DeadTopics.as_str())]);
        Ok(())
    }
}

#[async_trait]
impl Worker for FetchWorker {
    const NAME: &'static str = "fetch";

    async fn step(&mut self) -> Result<Progress> {
        let mut tx = self.store.begin(TxMode::ReadWrite).await?;

        let Some(raw) = tx.try_dequeue(QueueName::Topics).await? else {
            tx.commit().await?;
            return Ok(Progress::Idle);
        };

        let Some(topic) = Topic::parse(&raw) else {
            warn!("discarding blank topic found in the topic queue");
            tx.commit().await?;
            return Ok(Progress::Worked);
        };

        let started = Instant::now();
        let found = self.search.search(&topic, self.config.search_limit).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::collaborator_duration_ms().record(
            elapsed_ms,
            &[
                KeyValue::new("collaborator", "search"),
                KeyValue::new("result", if found.is_ok() { "ok" } else { "error" }),
            ],
        );

        match found {
            Ok(tweets) => {
                for text in tweets.iter().take(self.config.search_limit) {
                    tx.enqueue(QueueName::Tweets, text).await?;
                }
                tx.commit().await?;
                self.attempts.reset();

                let count = tweets.len().min(self.config.search_limit);
                metrics::tweets_fetched().add(count as u64, &[]);
                info!(topic = %topic, tweets = count, "fetched tweets");
                Ok(Progress::Worked)
            }
            Err(e) => {
                let attempts = self.attempts.record_failure(&raw);
                if self.config.retry.exhausted(attempts) {
                    warn!(topic = %topic, attempts, "search retries exhausted, dead-lettering topic");
                    self.dead_letter(tx, &raw).await?;
                } else if let Err(abort) = tx.abort().await {
                    warn!("abort after failed search: {abort}");
                }
                Err(e.into())
            }
        }
    }

    fn pause(&self, _progress: Progress) -> Duration {
        self.config.fetch_interval
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }
}
