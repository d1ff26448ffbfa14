//! Pipeline engine: the two workers, topic changes, the aggregate reader,
//! and the lifecycle that ties them together.
//!
//! The workers share nothing in process. They are coupled only through the
//! durable store's queues, which is what makes a restart pick up exactly
//! where the last commit left off.

pub mod aggregate;
pub mod fetch;
pub mod retry;
pub mod score;
pub mod service;
pub mod shutdown;
pub mod topic;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::search::TweetSearch;
use crate::sentiment::SentimentScorer;
use crate::store::DurableStore;

pub use aggregate::AggregateReader;
pub use fetch::FetchWorker;
pub use retry::RetryPolicy;
pub use score::ScoreWorker;
pub use service::TweetService;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use topic::{TopicChange, TopicController};

/// Worker timing and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Pause between fetch iterations, whether or not a topic was found.
    pub fetch_interval: Duration,
    /// Tweets taken from one search.
    pub search_limit: usize,
    pub retry: RetryPolicy,
    /// Pause after the score worker finds the tweet queue empty.
    pub idle_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_secs(10),
            search_limit: crate::search::MAX_SEARCH_RESULTS,
            retry: RetryPolicy::default(),
            idle_delay: Duration::ZERO,
        }
    }
}

/// Service lifecycle: `Stopped → Running → CancelRequested → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Stopped,
    Running,
    CancelRequested,
}

impl PipelineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PipelineState::Running,
            2 => PipelineState::CancelRequested,
            _ => PipelineState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Stopped => "stopped",
            PipelineState::Running => "running",
            PipelineState::CancelRequested => "cancel_requested",
        }
    }
}

/// Shared, lock-free lifecycle cell.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle(Arc<AtomicU8>);

impl Lifecycle {
    pub(crate) fn new(state: PipelineState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub(crate) fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// A configured but not yet running pipeline.
pub struct Pipeline {
    store: Arc<dyn DurableStore>,
    search: Arc<dyn TweetSearch>,
    scorer: Arc<dyn SentimentScorer>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DurableStore>,
        search: Arc<dyn TweetSearch>,
        scorer: Arc<dyn SentimentScorer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            search,
            scorer,
            config,
        }
    }

    /// Spawn both workers on the current runtime.
    pub fn start(self) -> PipelineHandle {
        let shutdown = Shutdown::new();
        let lifecycle = Lifecycle::new(PipelineState::Running);

        let fetch = FetchWorker::new(Arc::clone(&self.store), self.search, self.config);
        let score = ScoreWorker::new(Arc::clone(&self.store), self.scorer, self.config);
        let joins = vec![
            tokio::spawn(worker::drive(fetch, shutdown.signal())),
            tokio::spawn(worker::drive(score, shutdown.signal())),
        ];

        let service = TweetService::new(self.store, Some(shutdown.signal()), lifecycle.clone());
        info!(
            fetch_interval_secs = self.config.fetch_interval.as_secs(),
            search_limit = self.config.search_limit,
            "pipeline started"
        );

        PipelineHandle {
            shutdown,
            lifecycle,
            joins,
            service,
        }
    }
}

/// Owner of the running workers.
pub struct PipelineHandle {
    shutdown: Shutdown,
    lifecycle: Lifecycle,
    joins: Vec<JoinHandle<()>>,
    service: TweetService,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        self.lifecycle.get()
    }

    /// Facade for the remote operations, bound to this pipeline's lifecycle.
    pub fn service(&self) -> TweetService {
        self.service.clone()
    }

    /// Ask both workers to stop. In-flight iterations are interrupted and
    /// roll back. Calling this again is a no-op.
    pub fn shutdown(&self) {
        if self.shutdown.is_triggered() {
            return;
        }
        if self.lifecycle.get() == PipelineState::Running {
            self.lifecycle.set(PipelineState::CancelRequested);
        }
        info!("pipeline shutdown requested");
        self.shutdown.trigger();
    }

    /// Wait for both workers to exit.
    pub async fn join(self) {
        for join in self.joins {
            if let Err(e) = join.await {
                warn!("worker task ended abnormally: {e}");
            }
        }
        self.lifecycle.set(PipelineState::Stopped);
        info!("pipeline stopped");
    }

    /// [`shutdown`](Self::shutdown) then [`join`](Self::join).
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}
