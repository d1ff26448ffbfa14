//! Twitter v1.1 standard search, signed with OAuth 1.0a user context.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{Instrument, debug};

use super::oauth::OAuthSigner;
use super::{MAX_SEARCH_RESULTS, SearchError, TweetSearch};
use crate::config::TwitterCredentials;
use crate::model::Topic;
use crate::telemetry::collaborator::{record_result_count, start_search_span};

pub const DEFAULT_SEARCH_URL: &str = "https://api.twitter.com/1.1/search/tweets.json";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    full_text: Option<String>,
    text: Option<String>,
}

/// Extract tweet texts from a search response body, keeping at most `limit`.
fn parse_statuses(body: &str, limit: usize) -> Result<Vec<String>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(response
        .statuses
        .into_iter()
        .filter_map(|s| s.full_text.or(s.text))
        .take(limit)
        .collect())
}

/// Production [`TweetSearch`] client.
pub struct TwitterSearch {
    client: Client,
    signer: OAuthSigner,
    search_url: String,
    timeout: Duration,
}

impl TwitterSearch {
    pub fn new(
        credentials: TwitterCredentials,
        search_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            signer: OAuthSigner::new(credentials),
            search_url: search_url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl TweetSearch for TwitterSearch {
    async fn search(&self, topic: &Topic, limit: usize) -> Result<Vec<String>, SearchError> {
        let limit = limit.clamp(1, MAX_SEARCH_RESULTS);
        let count = limit.to_string();
        let params = [
            ("q", topic.as_str()),
            ("count", count.as_str()),
            ("tweet_mode", "extended"),
        ];

        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let authorization = self.signer.authorization(
            "GET",
            &self.search_url,
            &params,
            &nonce,
            chrono::Utc::now().timestamp(),
        )?;

        let span = start_search_span(topic.as_str());
        async {
            let response = self
                .client
                .get(&self.search_url)
                .query(&params)
                .header(reqwest::header::AUTHORIZATION, authorization)
                .send()
                .await
                .map_err(|e| self.map_transport(e))?;

            let status = response.status();
            let body = response.text().await.map_err(|e| self.map_transport(e))?;
            if !status.is_success() {
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let tweets = parse_statuses(&body, limit)?;
            record_result_count(&tracing::Span::current(), tweets.len());
            debug!(topic = %topic, found = tweets.len(), "search complete");
            Ok(tweets)
        }
        .instrument(span)
        .await
    }
}

impl TwitterSearch {
    fn map_transport(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            SearchError::Http(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_full_text_and_respects_limit() {
        let body = r#"{
            "statuses": [
                {"full_text": "long one", "text": "long…"},
                {"text": "short one"},
                {"id": 3},
                {"text": "over the limit"}
            ],
            "search_metadata": {"count": 4}
        }"#;
        let tweets = parse_statuses(body, 3).unwrap();
        assert_eq!(tweets, vec!["long one", "short one", "over the limit"]);

        let tweets = parse_statuses(body, 1).unwrap();
        assert_eq!(tweets, vec!["long one"]);
    }

    #[test]
    fn missing_statuses_means_no_matches() {
        assert!(parse_statuses("{}", 100).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_statuses("<html>", 100),
            Err(SearchError::Parse(_))
        ));
    }
}
