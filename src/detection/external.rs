//! Paid external detector client
//!
//! Talks to a hosted AI-detection API over HTTP. More reliable than the
//! local heuristics but metered, so the ensemble consults it only when
//! the configured usage mode says to.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::ExternalDetectorConfig;

use super::{DetectionScore, Detector, SentenceScore};

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

/// HTTP client for the external detector.
pub struct ExternalDetector {
    client: Client,
    base_url: String,
    api_key: String,
    min_input_chars: usize,
}

impl ExternalDetector {
    /// Build from config. Returns None when no endpoint is configured or
    /// the API key environment variable is unset.
    pub fn from_config(config: &ExternalDetectorConfig) -> Option<Self> {
        if config.base_url.is_empty() {
            return None;
        }
        let api_key = std::env::var(&config.api_key_env).ok()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;
        Some(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            min_input_chars: config.min_input_chars,
        })
    }
}

#[async_trait]
impl Detector for ExternalDetector {
    fn name(&self) -> &str {
        "external"
    }

    async fn detect(&self, text: &str) -> Result<DetectionScore> {
        if text.chars().count() < self.min_input_chars {
            bail!(
                "text below external detector minimum length ({} chars)",
                self.min_input_chars
            );
        }

        let response = self
            .client
            .post(format!("{}/v1/detect", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&DetectRequest { text })
            .send()
            .await
            .context("Failed to reach external detector")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("external detector error ({}): {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read external detector response")?;

        // Providers disagree on field names; navigate the raw value.
        let raw: serde_json::Value = serde_json::from_str(&body)
            .context("Failed to parse external detector response")?;

        let ai_score = raw
            .get("ai_probability")
            .or_else(|| raw.get("ai_score"))
            .or_else(|| raw.get("score"))
            .and_then(|v| v.as_f64())
            .context("external detector response missing score field")?;

        let sentence_scores = raw
            .get("sentences")
            .and_then(|v| v.as_array())
            .map(|sentences| {
                sentences
                    .iter()
                    .filter_map(|s| {
                        let text = s.get("text").and_then(|t| t.as_str())?;
                        let score = s.get("score").and_then(|v| v.as_f64())?;
                        Some(SentenceScore {
                            sentence: text.to_string(),
                            score,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(DetectionScore {
            ai_score: ai_score.clamp(0.0, 1.0),
            sentence_scores,
            method: "external".to_string(),
        })
    }
}
