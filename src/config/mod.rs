//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.
//!
//! [`Config`] covers what every command needs. The search and scoring
//! credentials live in [`CollaboratorConfig`], which only `serve` loads.

pub mod secrets;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{PipelineConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::search::twitter::DEFAULT_SEARCH_URL;
use crate::sentiment::text_analytics::DEFAULT_BASE_URL;
use secrecy::SecretString;

/// The four user-context credentials the search API requires.
#[derive(Debug)]
pub struct TwitterCredentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub access_token: SecretString,
    pub access_token_secret: SecretString,
}

/// Which durable store backs the pipeline.
#[derive(Debug)]
pub enum StoreConfig {
    /// Postgres with the pgmq extension.
    Postgres { database_url: SecretString },
    /// In-process store, journaled to `journal` when set.
    Memory { journal: Option<PathBuf> },
}

#[derive(Debug)]
pub struct Config {
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub listen_addr: SocketAddr,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let store = match vars.optional("PULSE_STORE").as_deref() {
            None | Some("postgres") => StoreConfig::Postgres {
                database_url: vars.secret("DATABASE_URL")?,
            },
            Some("memory") => StoreConfig::Memory {
                journal: vars.optional("PULSE_JOURNAL").map(PathBuf::from),
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "PULSE_STORE must be \"postgres\" or \"memory\", got {other:?}"
                )));
            }
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            fetch_interval: Duration::from_secs(
                vars.parsed("FETCH_INTERVAL_SECS", defaults.fetch_interval.as_secs())?,
            ),
            search_limit: vars
                .parsed("SEARCH_LIMIT", defaults.search_limit)?
                .clamp(1, crate::search::MAX_SEARCH_RESULTS),
            retry: RetryPolicy {
                max_attempts: vars
                    .parsed("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?
                    .max(1),
                base_delay: Duration::from_millis(vars.parsed(
                    "RETRY_BASE_DELAY_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
                max_delay: Duration::from_millis(vars.parsed(
                    "RETRY_MAX_DELAY_MS",
                    defaults.retry.max_delay.as_millis() as u64,
                )?),
                ..defaults.retry
            },
            ..defaults
        };

        Ok(Self {
            store,
            pipeline,
            listen_addr: vars.parsed("LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 8080)))?,
            otel_endpoint: vars.optional("OTEL_ENDPOINT"),
            log_level: vars
                .optional("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Endpoints and credentials for the search and scoring services.
#[derive(Debug)]
pub struct CollaboratorConfig {
    pub twitter: TwitterCredentials,
    pub twitter_search_url: String,
    pub sentiment_account_key: SecretString,
    pub sentiment_base_url: String,
    /// Upper bound on any single collaborator call.
    pub timeout: Duration,
}

impl CollaboratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            twitter: TwitterCredentials {
                consumer_key: vars.secret("TWITTER_CONSUMER_KEY")?,
                consumer_secret: vars.secret("TWITTER_CONSUMER_SECRET")?,
                access_token: vars.secret("TWITTER_ACCESS_TOKEN")?,
                access_token_secret: vars.secret("TWITTER_ACCESS_TOKEN_SECRET")?,
            },
            twitter_search_url: vars
                .optional("TWITTER_SEARCH_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            sentiment_account_key: vars.secret("SENTIMENT_ACCOUNT_KEY")?,
            sentiment_base_url: vars
                .optional("SENTIMENT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(vars.parsed("COLLABORATOR_TIMEOUT_SECS", 30)?),
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and empty are treated the same.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
    }

    fn secret(&self, name: &str) -> Result<SecretString> {
        self.required(name).map(SecretString::from)
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        }
    }
}
