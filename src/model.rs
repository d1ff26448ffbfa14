//! Core data model.
//!
//! The pipeline moves plain strings through two durable queues and folds
//! scores into a durable map keyed by tweet text. Everything here is the
//! typed vocabulary around those strings.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// The tweet-search subject currently active for the pipeline.
///
/// Construction is the validation gate: blank subjects never become a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Returns `None` for empty or whitespace-only subjects.
    /// The subject is otherwise kept verbatim.
    pub fn parse(subject: &str) -> Option<Self> {
        if subject.trim().is_empty() {
            None
        } else {
            Some(Self(subject.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// The named durable queues the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    /// Pending topic-change requests (0 or 1 entries after a completed topic change).
    Topics,
    /// Raw tweet texts awaiting scoring, in fetch order.
    Tweets,
    /// Topics whose search kept failing past the retry budget.
    DeadTopics,
    /// Tweet texts whose scoring kept failing past the retry budget.
    DeadTweets,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        QueueName::Topics,
        QueueName::Tweets,
        QueueName::DeadTopics,
        QueueName::DeadTweets,
    ];

    /// Storage name of the queue.
    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Topics => "topics",
            QueueName::Tweets => "tweets",
            QueueName::DeadTopics => "dead_topics",
            QueueName::DeadTweets => "dead_tweets",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// A sentiment score for a single tweet. Always finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentimentScore(f64);

impl SentimentScore {
    /// Returns `None` for NaN or infinite values.
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Derived view of the score map: how many tweets are scored and their mean.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub tweet_count: u64,
    pub average_score: f64,
}

impl Aggregate {
    /// Mean of `scores`, or zero when there are none.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (count, sum) = scores
            .into_iter()
            .fold((0u64, 0.0f64), |(n, s), v| (n + 1, s + v));
        Self {
            tweet_count: count,
            average_score: if count == 0 { 0.0 } else { sum / count as f64 },
        }
    }
}

/// Queue depths and map size taken from one consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub pending_topics: u64,
    pub pending_tweets: u64,
    pub dead_topics: u64,
    pub dead_tweets: u64,
    pub scored_tweets: u64,
}
