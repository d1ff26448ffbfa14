//! The remote-operation facade over the topic controller and the reader.

use std::sync::Arc;

use super::aggregate::AggregateReader;
use super::shutdown::ShutdownSignal;
use super::topic::{TopicChange, TopicController};
use super::{Lifecycle, PipelineState};
use crate::error::Result;
use crate::model::{Aggregate, PipelineStatus};
use crate::store::DurableStore;

/// `SetTweetSubject` / `GetAverageSentimentScore`, as served to callers.
///
/// Once shutdown has been requested the service stops taking topic changes
/// and reports no aggregate.
#[derive(Clone)]
pub struct TweetService {
    store: Arc<dyn DurableStore>,
    topics: TopicController,
    reader: AggregateReader,
    shutdown: Option<ShutdownSignal>,
    lifecycle: Lifecycle,
}

impl TweetService {
    pub(crate) fn new(
        store: Arc<dyn DurableStore>,
        shutdown: Option<ShutdownSignal>,
        lifecycle: Lifecycle,
    ) -> Self {
        Self {
            topics: TopicController::new(Arc::clone(&store)),
            reader: AggregateReader::new(Arc::clone(&store)),
            store,
            shutdown,
            lifecycle,
        }
    }

    /// A service with no workers behind it, for one-shot CLI commands.
    pub fn standalone(store: Arc<dyn DurableStore>) -> Self {
        Self::new(store, None, Lifecycle::new(PipelineState::Stopped))
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownSignal::is_cancelled)
    }

    pub async fn set_tweet_subject(&self, subject: Option<&str>) -> Result<TopicChange> {
        match subject {
            Some(subject) if !self.cancelled() => self.topics.set_topic(subject).await,
            _ => Ok(TopicChange::Ignored),
        }
    }

    /// `None` once shutdown has been requested.
    pub async fn get_average_sentiment_score(&self) -> Result<Option<Aggregate>> {
        if self.cancelled() {
            return Ok(None);
        }
        self.reader.average().await.map(Some)
    }

    pub async fn status(&self) -> Result<PipelineStatus> {
        self.reader.status().await
    }

    /// Whether the backing store answers.
    pub async fn health(&self) -> Result<()> {
        self.store.health_check().await
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.get()
    }
}
