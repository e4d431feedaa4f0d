//! Analysis API client
//!
//! One call to the external analysis endpoint per transcript. Every failure
//! (network, timeout, non-2xx, unparsable body) degrades to the fixed
//! placeholder result instead of surfacing as an error.

use crate::config::AnalysisConfig;
use crate::models::{AnalysisPayload, AnalysisResult, SourceRecord};
use crate::services::batch_orchestrator::Analyze;
use crate::services::response_envelope::ResponseEnvelope;
use crate::services::result_normalizer;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("callsight/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Why an analysis call degraded
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl AnalysisError {
    fn is_server_error(&self) -> bool {
        matches!(self, AnalysisError::Status(code, _) if *code >= 500)
    }
}

/// Result of one `analyze` call; never an error
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(AnalysisPayload),
    Degraded(AnalysisError),
}

impl AnalysisOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisOutcome::Degraded(_))
    }

    /// Normalized result; degraded outcomes become the placeholder
    pub fn into_result(self) -> AnalysisResult {
        match self {
            AnalysisOutcome::Completed(payload) => result_normalizer::normalize(&payload),
            AnalysisOutcome::Degraded(_) => AnalysisResult::degraded(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    question: &'a str,
    #[serde(rename = "overrideConfig", skip_serializing_if = "Option::is_none")]
    override_config: Option<OverrideConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct OverrideConfig<'a> {
    #[serde(rename = "systemMessagePrompt", skip_serializing_if = "Option::is_none")]
    system_message_prompt: Option<&'a str>,
    #[serde(rename = "exampleJson", skip_serializing_if = "Option::is_none")]
    example_json: Option<String>,
}

/// Analysis API client
pub struct AnalysisClient {
    http_client: reqwest::Client,
    config: AnalysisConfig,
    rate_limiter: Option<DefaultDirectRateLimiter>,
}

impl AnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let rate_limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            http_client,
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a transcript using the configured example schema
    pub async fn analyze(&self, transcript: &str) -> AnalysisOutcome {
        self.analyze_with_example(transcript, self.config.example_json.as_ref())
            .await
    }

    /// Analyze a transcript, overriding the example schema sent to the service
    ///
    /// A 5xx answer to an oversized transcript is retried once with the
    /// transcript cut to `truncate_chars` characters.
    pub async fn analyze_with_example(&self, transcript: &str, example: Option<&Value>) -> AnalysisOutcome {
        let err = match self.request(transcript, example).await {
            Ok(payload) => return AnalysisOutcome::Completed(payload),
            Err(e) => e,
        };

        let limit = self.config.truncate_chars;
        if err.is_server_error() && transcript.chars().count() > limit {
            let truncated: String = transcript.chars().take(limit).collect();
            warn!(
                error = %err,
                original_chars = transcript.chars().count(),
                truncated_chars = limit,
                "Analysis failed on oversized transcript, retrying truncated"
            );
            return match self.request(&truncated, example).await {
                Ok(payload) => AnalysisOutcome::Completed(payload),
                Err(retry_err) => {
                    warn!(error = %retry_err, "Truncated retry failed, degrading");
                    AnalysisOutcome::Degraded(retry_err)
                }
            };
        }

        warn!(error = %err, "Analysis failed, degrading");
        AnalysisOutcome::Degraded(err)
    }

    /// One rate-limited request under the wall-clock timeout
    async fn request(&self, transcript: &str, example: Option<&Value>) -> Result<AnalysisPayload, AnalysisError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        // Dropping the send future on expiry cancels the in-flight request
        match tokio::time::timeout(self.config.timeout, self.send(transcript, example)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(self.config.timeout)),
        }
    }

    async fn send(&self, transcript: &str, example: Option<&Value>) -> Result<AnalysisPayload, AnalysisError> {
        let override_config = match (self.config.system_prompt.as_deref(), example) {
            (None, None) => None,
            (prompt, example) => Some(OverrideConfig {
                system_message_prompt: prompt,
                example_json: example.map(Value::to_string),
            }),
        };
        let body = PredictionRequest {
            question: transcript,
            override_config,
        };

        debug!(chars = transcript.chars().count(), "Querying analysis API");

        let mut request = self.http_client.post(self.config.prediction_url()).json(&body);
        if !self.config.api_key.trim().is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(self.config.timeout)
            } else {
                AnalysisError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status(status.as_u16(), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        ResponseEnvelope::classify(body)
            .into_payload()
            .map_err(AnalysisError::Parse)
    }
}

#[async_trait]
impl Analyze for AnalysisClient {
    async fn analyze(&self, record: &SourceRecord) -> AnalysisOutcome {
        AnalysisClient::analyze(self, &record.transcript).await
    }
}
