//! Metric instrument factories for tweet-pulse.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"tweet-pulse"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for tweet-pulse instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("tweet-pulse")
}

/// Counter: queue-level operations (create, send, pop, purge).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("pulse.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: tweet texts enqueued for scoring.
pub fn tweets_fetched() -> Counter<u64> {
    meter()
        .u64_counter("pulse.tweets.fetched")
        .with_description("Tweet texts enqueued for scoring")
        .build()
}

/// Counter: scores written to the score map.
pub fn tweets_scored() -> Counter<u64> {
    meter()
        .u64_counter("pulse.tweets.scored")
        .with_description("Scores written to the score map")
        .build()
}

/// Counter: items moved to a dead-letter queue after exhausting retries.
/// Labels: `queue` (the dead-letter queue).
pub fn items_dead_lettered() -> Counter<u64> {
    meter()
        .u64_counter("pulse.items.dead_lettered")
        .with_description("Items moved to a dead-letter queue")
        .build()
}

/// Counter: failed worker iterations.
/// Labels: `worker` ("fetch" | "score"), `kind` ("store" | "search" | "scoring" | ...).
pub fn iteration_failures() -> Counter<u64> {
    meter()
        .u64_counter("pulse.iteration.failures")
        .with_description("Failed worker iterations")
        .build()
}

/// Counter: topic change requests.
/// Labels: `result` ("set" | "ignored").
pub fn topic_changes() -> Counter<u64> {
    meter()
        .u64_counter("pulse.topic.changes")
        .with_description("Topic change requests")
        .build()
}

/// Histogram: collaborator call duration in milliseconds.
/// Labels: `collaborator` ("search" | "score"), `result` ("ok" | "error").
pub fn collaborator_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("pulse.collaborator.duration_ms")
        .with_description("Collaborator call duration in milliseconds")
        .with_unit("ms")
        .build()
}
