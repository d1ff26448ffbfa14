//! Error types for tweet-pulse.

use thiserror::Error;

use crate::search::SearchError;
use crate::sentiment::ScoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal error: {0}")]
    Journal(#[from] serde_json::Error),

    #[error("journal {} is already open in another store", .0.display())]
    JournalLocked(std::path::PathBuf),

    #[error("mutation attempted in a read-only transaction")]
    ReadOnly,

    #[error("tweet search failed: {0}")]
    Search(#[from] SearchError),

    #[error("sentiment scoring failed: {0}")]
    Scoring(#[from] ScoreError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_)
            | Error::Io(_)
            | Error::Journal(_)
            | Error::JournalLocked(_)
            | Error::ReadOnly => "store",
            Error::Search(_) => "search",
            Error::Scoring(_) => "scoring",
            Error::Other(_) => "other",
        }
    }

    /// True when the failure came from an external collaborator rather than the store.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Error::Search(_) | Error::Scoring(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
