//! HTTP client for the OpenAI-compatible completion API
//!
//! Transport failures are retried with exponential backoff up to a
//! configured bound, then surfaced. Auth failures are not retried.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CompletionConfig;

use super::{CompletionBackend, CompletionRequest};

/// Failure classes for completion calls.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Service unreachable, overloaded, or rate-limited; retried before surfacing
    #[error("transport failure: {0}")]
    Transport(String),
    /// Invalid or missing credentials; never retried
    #[error("authentication failure: {0}")]
    Auth(String),
    /// 2xx response we could not extract text from
    #[error("malformed response: {0}")]
    BadResponse(String),
}

/// Classify an HTTP status into a completion error, and whether it is
/// worth retrying.
pub fn classify_status(status: StatusCode, body: &str) -> (CompletionError, bool) {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        (CompletionError::Auth(format!("{}: {}", status, body)), false)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        (CompletionError::Transport(format!("{}: {}", status, body)), true)
    } else {
        (CompletionError::Transport(format!("{}: {}", status, body)), false)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    /// Per-attempt nonce. Carried in the standard `user` field so
    /// prompt-keyed caches see every adaptive retry as distinct.
    user: &'a str,
}

/// reqwest-backed completion client.
pub struct HttpCompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl HttpCompletionClient {
    /// Build from config; the API key comes from the configured
    /// environment variable.
    pub fn from_config(config: &CompletionConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "completion API key not set (expected in ${})",
                config.api_key_env
            )
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
            backoff_ms: config.backoff_ms,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, (CompletionError, bool)> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            user: &request.nonce,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let retryable = e.is_timeout() || e.is_connect();
                (CompletionError::Transport(e.to_string()), retryable)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| (CompletionError::Transport(e.to_string()), true))?;

        // Parse as a raw value; providers disagree on optional fields.
        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| (CompletionError::BadResponse(e.to_string()), false))?;

        let content = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string());

        match content {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err((
                CompletionError::BadResponse("no content in completion response".to_string()),
                false,
            )),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let mut backoff = self.backoff_ms;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.send_once(request).await {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err((error, retryable)) => {
                    if retryable && attempt < self.max_retries {
                        warn!(
                            attempt,
                            backoff_ms = backoff,
                            "completion transport failure, retrying: {error}"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                        backoff = backoff.saturating_mul(2);
                        last_error = Some(error);
                    } else {
                        return Err(error);
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| CompletionError::Transport("retries exhausted".to_string())))
    }
}
