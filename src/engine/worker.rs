//! The loop shared by the fetch and score workers.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, error, info, warn};

use super::retry::RetryPolicy;
use super::shutdown::ShutdownSignal;
use crate::error::Result;
use crate::telemetry::metrics;
use crate::telemetry::pipeline::{record_outcome, start_iteration_span};

/// What a single iteration accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// The input queue was empty.
    Idle,
    /// An item was consumed and its transaction committed.
    Worked,
}

/// One transactional step over an input queue.
///
/// A step either commits or leaves the store untouched; `drive` never
/// needs to clean up after one.
#[async_trait]
pub(crate) trait Worker: Send + 'static {
    const NAME: &'static str;

    async fn step(&mut self) -> Result<Progress>;

    /// Delay before the next iteration after a successful one.
    fn pause(&self, progress: Progress) -> Duration;

    fn retry_policy(&self) -> &RetryPolicy;
}

/// Run `worker` until `shutdown` fires.
///
/// Cancellation is checked between iterations and raced against the
/// in-flight step. A step dropped mid-flight drops its transaction, which
/// rolls it back, so the item it held stays queued. A step dropped inside
/// `commit` is not rolled back: stores finish a started commit even when
/// the caller stops waiting for it.
pub(crate) async fn drive<W: Worker>(mut worker: W, mut shutdown: ShutdownSignal) {
    info!(worker = W::NAME, "worker started");
    let mut iteration: u64 = 0;
    let mut failures: u32 = 0;

    loop {
        if shutdown.is_cancelled() {
            break;
        }
        iteration += 1;

        let span = start_iteration_span(W::NAME, iteration);
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(worker = W::NAME, iteration, "iteration interrupted by shutdown");
                break;
            }
            result = worker.step().instrument(span.clone()) => result,
        };

        let wait = match result {
            Ok(progress) => {
                failures = 0;
                record_outcome(
                    &span,
                    match progress {
                        Progress::Idle => "idle",
                        Progress::Worked => "worked",
                    },
                );
                worker.pause(progress)
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                record_outcome(&span, "failed");
                metrics::iteration_failures().add(
                    1,
                    &[
                        KeyValue::new("worker", W::NAME),
                        KeyValue::new("kind", e.kind()),
                    ],
                );
                let backoff = worker.retry_policy().backoff(failures);
                let backoff_ms = backoff.as_millis() as u64;
                // Collaborator outages are expected and retried per item;
                // store failures mean nothing can make progress.
                if e.is_collaborator() {
                    warn!(
                        worker = W::NAME,
                        iteration,
                        failures,
                        backoff_ms,
                        kind = e.kind(),
                        "iteration failed: {e}"
                    );
                } else {
                    error!(
                        worker = W::NAME,
                        iteration,
                        failures,
                        backoff_ms,
                        kind = e.kind(),
                        "iteration failed: {e}"
                    );
                }
                backoff.max(worker.pause(Progress::Worked))
            }
        };

        if wait.is_zero() {
            tokio::task::yield_now().await;
        } else if !shutdown.sleep(wait).await {
            break;
        }
    }

    info!(worker = W::NAME, iterations = iteration, "worker stopped");
}
