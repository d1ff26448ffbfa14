//! Worker iteration span helpers.

use tracing::Span;

/// Start a span for one iteration of a pipeline worker.
///
/// Debug level: the score worker polls continuously and idle iterations
/// would otherwise dominate exported traces.
///
/// The `iteration.outcome` field is declared empty and can be filled via
/// [`record_outcome`].
pub fn start_iteration_span(worker: &'static str, iteration: u64) -> Span {
    tracing::debug_span!(
        "pipeline.iteration",
        "pipeline.worker" = worker,
        "pipeline.iteration" = iteration,
        "iteration.outcome" = tracing::field::Empty,
    )
}

/// Record how an iteration ended ("idle", "fetched", "scored", "failed", ...).
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("iteration.outcome", outcome);
}
