//! Text-analytics `GetSentiment` client (basic auth with an account key).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{Instrument, debug};

use super::{ScoreError, SentimentScorer};
use crate::model::SentimentScore;
use crate::telemetry::collaborator::start_score_span;

pub const DEFAULT_BASE_URL: &str = "https://api.datamarket.azure.com/";

const SENTIMENT_PATH: &str = "data.ashx/amla/text-analytics/v1/GetSentiment";

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    #[serde(rename = "Score")]
    score: f64,
}

/// The service scores from 0 (negative) to 1 (positive).
fn parse_score(body: &str) -> Result<SentimentScore, ScoreError> {
    let response: SentimentResponse =
        serde_json::from_str(body).map_err(|e| ScoreError::Parse(e.to_string()))?;
    if !(0.0..=1.0).contains(&response.score) {
        return Err(ScoreError::InvalidScore(response.score));
    }
    SentimentScore::new(response.score).ok_or(ScoreError::InvalidScore(response.score))
}

/// Production [`SentimentScorer`] client.
pub struct TextAnalyticsScorer {
    client: Client,
    account_key: SecretString,
    endpoint: String,
    timeout: Duration,
}

impl TextAnalyticsScorer {
    pub fn new(
        account_key: SecretString,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ScoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            account_key,
            endpoint: format!("{}/{SENTIMENT_PATH}", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> ScoreError {
        if e.is_timeout() {
            ScoreError::Timeout(self.timeout)
        } else {
            ScoreError::Http(e)
        }
    }
}

#[async_trait]
impl SentimentScorer for TextAnalyticsScorer {
    async fn score(&self, text: &str) -> Result<SentimentScore, ScoreError> {
        let span = start_score_span(text.chars().count());
        async {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("Text", text)])
                .basic_auth("AccountKey", Some(self.account_key.expose_secret()))
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| self.map_transport(e))?;

            let status = response.status();
            let body = response.text().await.map_err(|e| self.map_transport(e))?;
            if !status.is_success() {
                return Err(ScoreError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let score = parse_score(&body)?;
            debug!(score = score.value(), "scored");
            Ok(score)
        }
        .instrument(span)
        .await
    }
}
