//! Integration tests for telemetry initialization and span helpers.

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = tweet_pulse::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "tweet-pulse-test".to_string(),
        default_level: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = tweet_pulse::telemetry::init_telemetry(config);
}

#[test]
fn search_span_creates_and_records_results() {
    let span = tweet_pulse::telemetry::collaborator::start_search_span("rust");
    tweet_pulse::telemetry::collaborator::record_result_count(&span, 42);
}

#[test]
fn score_span_creates() {
    let _span = tweet_pulse::telemetry::collaborator::start_score_span(140);
}

#[test]
fn iteration_span_creates_and_records_outcome() {
    let span = tweet_pulse::telemetry::pipeline::start_iteration_span("fetch", 1);
    tweet_pulse::telemetry::pipeline::record_outcome(&span, "idle");
}

#[test]
fn metric_instruments_build_without_a_provider() {
    use opentelemetry::KeyValue;
    use tweet_pulse::telemetry::metrics;

    metrics::tweets_fetched().add(3, &[]);
    metrics::iteration_failures().add(
        1,
        &[KeyValue::new("worker", "score"), KeyValue::new("kind", "scoring")],
    );
    metrics::collaborator_duration_ms().record(12.5, &[KeyValue::new("collaborator", "search")]);
}
