//! Success prediction before generation
//!
//! A historical-frequency estimator over the same temperature-bucket
//! aggregates the advisor uses. Consulted optionally before an attempt
//! to short-circuit parameter choices predicted very unlikely to
//! succeed.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LearningConfig;
use crate::feedback::{FeedbackStore, TemperatureBucket};

/// What the caller should do with the proposed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Proceed,
    Adjust,
}

/// A suggested parameter change attached to an `Adjust` recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDelta {
    pub parameter: String,
    pub delta: f64,
}

/// Prediction for one hypothetical attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub success_probability: f64,
    /// Expected composite AI-likeness of the candidate
    pub expected_score: f64,
    pub recommendation: Recommendation,
    pub suggested_deltas: Vec<ParamDelta>,
}

/// Frequency-based success predictor.
pub struct SuccessPredictor {
    store: Arc<FeedbackStore>,
    config: LearningConfig,
}

impl SuccessPredictor {
    pub fn new(store: Arc<FeedbackStore>, config: LearningConfig) -> Self {
        Self { store, config }
    }

    pub async fn predict(
        &self,
        topic_category: &str,
        component_type: &str,
        temperature: f64,
        attempt_number: u32,
    ) -> Result<Prediction> {
        let buckets = self
            .store
            .query_aggregates(
                Some(topic_category),
                Some(component_type),
                self.config.temperature_bucket,
            )
            .await?;

        let step = self.config.temperature_bucket;
        let target_key = (temperature / step).round() as i64;
        let matching = buckets
            .iter()
            .find(|b| (b.temperature / step).round() as i64 == target_key);

        // Laplace smoothing keeps thin buckets away from 0 and 1.
        let (successes, total, mean_human) = match matching {
            Some(bucket) if bucket.total >= self.config.min_samples => {
                (bucket.successes, bucket.total, bucket.mean_human_score)
            }
            _ => overall(&buckets),
        };
        let base_probability = (successes as f64 + 1.0) / (total as f64 + 2.0);

        // Later attempts start from already-rejected parameters, so the
        // base rate overstates their chances.
        let attempt_discount = 0.9_f64.powi(attempt_number.saturating_sub(1) as i32);
        let success_probability = (base_probability * attempt_discount).clamp(0.0, 1.0);

        let expected_score = (1.0 - mean_human).clamp(0.0, 1.0);

        let mut suggested_deltas = Vec::new();
        let recommendation = if success_probability < 0.2 {
            if let Some(best) = best_bucket(&buckets, self.config.min_samples) {
                let delta = best.temperature - temperature;
                if delta.abs() > 1e-9 {
                    suggested_deltas.push(ParamDelta {
                        parameter: "temperature".to_string(),
                        delta,
                    });
                }
            }
            if expected_score > 0.7 {
                suggested_deltas.push(ParamDelta {
                    parameter: "persona.irregularity".to_string(),
                    delta: 0.1,
                });
            }
            Recommendation::Adjust
        } else {
            Recommendation::Proceed
        };

        Ok(Prediction {
            success_probability,
            expected_score,
            recommendation,
            suggested_deltas,
        })
    }
}

fn overall(buckets: &[TemperatureBucket]) -> (u32, u32, f64) {
    let total: u32 = buckets.iter().map(|b| b.total).sum();
    let successes: u32 = buckets.iter().map(|b| b.successes).sum();
    let mean_human = if total == 0 {
        0.5
    } else {
        buckets
            .iter()
            .map(|b| b.mean_human_score * b.total as f64)
            .sum::<f64>()
            / total as f64
    };
    (successes, total, mean_human)
}

fn best_bucket(buckets: &[TemperatureBucket], min_samples: u32) -> Option<&TemperatureBucket> {
    buckets
        .iter()
        .filter(|b| b.total >= min_samples)
        .max_by(|a, b| {
            a.success_rate()
                .partial_cmp(&b.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
