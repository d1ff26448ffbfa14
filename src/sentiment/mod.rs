//! Sentiment-scoring collaborator.
//!
//! A failed score is an error, never a number: callers can tell "the service
//! is down" apart from "this tweet is negative".

pub mod text_analytics;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::SentimentScore;

pub use text_analytics::TextAnalyticsScorer;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scoring endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparseable scoring response: {0}")]
    Parse(String),

    #[error("score {0} is outside the service's range")]
    InvalidScore(f64),

    #[error("scoring timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Scores the sentiment of one tweet text.
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<SentimentScore, ScoreError>;
}
