//! Score worker: drains the tweet queue into the score map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{debug, warn};

use super::PipelineConfig;
use super::retry::{AttemptTracker, RetryPolicy};
use super::worker::{Progress, Worker};
use crate::error::Result;
use crate::model::QueueName;
use crate::sentiment::SentimentScorer;
use crate::store::{DurableStore, TxMode};
use crate::telemetry::metrics;

/// Consumes one tweet text per iteration and records its score.
///
/// A failed scoring call aborts the transaction: the text stays at the
/// head of the tweet queue and nothing is written to the map. Texts that
/// keep failing are moved to the dead-tweet queue.
pub struct ScoreWorker {
    store: Arc<dyn DurableStore>,
    scorer: Arc<dyn SentimentScorer>,
    config: PipelineConfig,
    attempts: AttemptTracker,
}

impl ScoreWorker {
    pub fn new(
        store: Arc<dyn DurableStore>,
        scorer: Arc<dyn SentimentScorer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            scorer,
            config,
            attempts: AttemptTracker::default(),
        }
    }

    /// Run one scoring iteration. Returns whether a tweet was consumed.
    pub async fn score_once(&mut self) -> Result<bool> {
        Ok(self.step().await? == Progress::Worked)
    }
}

#[async_trait]
impl Worker for ScoreWorker {
    const NAME: &'static str = "score";

    async fn step(&mut self) -> Result<Progress> {
        let mut tx = self.store.begin(TxMode::ReadWrite).await?;

        let Some(text) = tx.try_dequeue(QueueName::Tweets).await? else {
            tx.commit().await?;
            return Ok(Progress::Idle);
        };

        let started = Instant::now();
        let scored = self.scorer.score(&text).await;
        metrics::collaborator_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[
                KeyValue::new("collaborator", "score"),
                KeyValue::new("result", if scored.is_ok() { "ok" } else { "error" }),
            ],
        );

        match scored {
            Ok(score) => {
                tx.put(&text, score.value()).await?;
                tx.commit().await?;
                self.attempts.reset();
                metrics::tweets_scored().add(1, &[]);
                debug!(score = score.value(), "scored tweet");
                Ok(Progress::Worked)
            }
            Err(e) => {
                let attempts = self.attempts.record_failure(&text);
                if self.config.retry.exhausted(attempts) {
                    warn!(attempts, "scoring retries exhausted, dead-lettering tweet");
                    tx.enqueue(QueueName::DeadTweets, &text).await?;
                    tx.commit().await?;
                    self.attempts.reset();
                    metrics::items_dead_lettered()
                        .add(1, &[KeyValue::new("queue", QueueName::DeadTweets.as_str())]);
                } else if let Err(abort) = tx.abort().await {
                    warn!("abort after failed scoring: {abort}");
                }
                Err(e.into())
            }
        }
    }

    fn pause(&self, progress: Progress) -> Duration {
        match progress {
            Progress::Worked => Duration::ZERO,
            Progress::Idle => self.config.idle_delay,
        }
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }
}
