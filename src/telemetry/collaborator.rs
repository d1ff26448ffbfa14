//! Span helpers for calls to external collaborators.
//!
//! Tweet texts and topics are user content, so spans carry sizes rather
//! than the text itself. The search topic is the exception: it is operator
//! input and the most useful field when a search misbehaves.

use tracing::Span;

/// Start a span around one tweet-search call.
///
/// `search.results` is declared empty and filled in via [`record_result_count`].
pub fn start_search_span(topic: &str) -> Span {
    tracing::info_span!(
        "collaborator.search",
        "search.topic" = topic,
        "search.results" = tracing::field::Empty,
    )
}

/// Start a span around one sentiment-scoring call.
pub fn start_score_span(text_chars: usize) -> Span {
    tracing::info_span!("collaborator.score", "score.text_chars" = text_chars)
}

/// Record how many tweets a search returned on a span from [`start_search_span`].
pub fn record_result_count(span: &Span, results: usize) {
    span.record("search.results", results);
}
