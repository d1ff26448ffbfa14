//! Tweet-search collaborator.
//!
//! The pipeline only needs "give me up to N tweet texts for this topic";
//! [`TweetSearch`] is that seam, and [`twitter::TwitterSearch`] is the
//! production client.

pub mod oauth;
pub mod twitter;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Topic;

pub use twitter::TwitterSearch;

/// Largest page the search endpoint serves.
pub const MAX_SEARCH_RESULTS: usize = 100;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparseable search response: {0}")]
    Parse(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("search timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Finds tweet texts for a topic.
#[async_trait]
pub trait TweetSearch: Send + Sync {
    /// Up to `limit` tweet texts, newest first. An empty result is not an error.
    async fn search(&self, topic: &Topic, limit: usize) -> Result<Vec<String>, SearchError>;
}
