//! Temperature recommendation from historical attempts
//!
//! Buckets attempts by rounded temperature, ranks buckets by success
//! rate then mean human-likeness, and returns the best bucket only when
//! it has enough samples. Below the sample threshold the caller's
//! fallback is returned untouched, never an extrapolated value.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::LearningConfig;
use crate::feedback::{FeedbackStore, TemperatureBucket};

/// Confidence in a recommendation, derived from sample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// A temperature recommendation with its evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureAdvice {
    pub temperature: f64,
    pub confidence: Confidence,
    pub sample_size: u32,
}

/// Read-only advisor over the feedback store.
pub struct TemperatureAdvisor {
    store: Arc<FeedbackStore>,
    config: LearningConfig,
}

impl TemperatureAdvisor {
    pub fn new(store: Arc<FeedbackStore>, config: LearningConfig) -> Self {
        Self { store, config }
    }

    /// Recommend a temperature for the given bucket, or return `fallback`
    /// with low confidence when history is too thin.
    pub async fn recommend(
        &self,
        topic_category: &str,
        component_type: &str,
        fallback: f64,
    ) -> Result<TemperatureAdvice> {
        let buckets = self
            .store
            .query_aggregates(
                Some(topic_category),
                Some(component_type),
                self.config.temperature_bucket,
            )
            .await?;

        let Some(best) = rank_buckets(&buckets) else {
            return Ok(TemperatureAdvice {
                temperature: fallback,
                confidence: Confidence::Low,
                sample_size: 0,
            });
        };

        if best.total < self.config.min_samples {
            debug!(
                sample_size = best.total,
                min = self.config.min_samples,
                "temperature advisor below sample threshold, using fallback"
            );
            return Ok(TemperatureAdvice {
                temperature: fallback,
                confidence: Confidence::Low,
                sample_size: best.total,
            });
        }

        let confidence = if best.total >= self.config.min_samples * 2 {
            Confidence::High
        } else {
            Confidence::Medium
        };

        Ok(TemperatureAdvice {
            temperature: best.temperature,
            confidence,
            sample_size: best.total,
        })
    }
}

/// Pick the best bucket: success rate first, mean human-likeness second,
/// lower temperature as the deterministic tie-break.
fn rank_buckets(buckets: &[TemperatureBucket]) -> Option<&TemperatureBucket> {
    buckets.iter().max_by(|a, b| {
        a.success_rate()
            .partial_cmp(&b.success_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.mean_human_score
                    .partial_cmp(&b.mean_human_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(
                b.temperature
                    .partial_cmp(&a.temperature)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NewAttempt;
    use crate::types::GenParams;

    async fn seed(store: &FeedbackStore, temperature: f64, success: bool) {
        store
            .append_attempt(&NewAttempt {
                topic: "Aluminum".to_string(),
                topic_category: "metals".to_string(),
                component_type: "caption".to_string(),
                params: GenParams::with_temperature(temperature),
                attempt_number: 1,
                generated_text: "text".to_string(),
                ai_score: if success { 0.2 } else { 0.9 },
                human_score: if success { 0.8 } else { 0.1 },
                readability_score: None,
                success,
                failure_type: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_two_bucket_scenario_prefers_higher_success_rate() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        // 10 attempts at 0.65 with 8 successes, 10 at 0.75 with 5 successes
        for i in 0..10 {
            seed(&store, 0.65, i < 8).await;
        }
        for i in 0..10 {
            seed(&store, 0.75, i < 5).await;
        }

        let advisor = TemperatureAdvisor::new(store, LearningConfig::default());
        let advice = advisor.recommend("metals", "caption", 0.7).await.unwrap();

        assert!((advice.temperature - 0.65).abs() < 1e-9);
        assert_eq!(advice.confidence, Confidence::High);
        assert_eq!(advice.sample_size, 10);
    }

    #[tokio::test]
    async fn test_thin_history_returns_fallback_low_confidence() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        for _ in 0..3 {
            seed(&store, 0.65, true).await;
        }

        let advisor = TemperatureAdvisor::new(store, LearningConfig::default());
        let advice = advisor.recommend("metals", "caption", 0.72).await.unwrap();

        // Never an extrapolated value below the sample threshold
        assert!((advice.temperature - 0.72).abs() < 1e-9);
        assert_eq!(advice.confidence, Confidence::Low);
        assert_eq!(advice.sample_size, 3);
    }

    #[tokio::test]
    async fn test_no_history_returns_fallback() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        let advisor = TemperatureAdvisor::new(store, LearningConfig::default());
        let advice = advisor.recommend("metals", "caption", 0.7).await.unwrap();
        assert!((advice.temperature - 0.7).abs() < 1e-9);
        assert_eq!(advice.confidence, Confidence::Low);
        assert_eq!(advice.sample_size, 0);
    }

    #[tokio::test]
    async fn test_tie_broken_by_human_likeness() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        // Equal success rates; 0.60 bucket has better human scores
        for _ in 0..6 {
            seed(&store, 0.60, true).await;
        }
        for _ in 0..6 {
            store
                .append_attempt(&NewAttempt {
                    topic: "Aluminum".to_string(),
                    topic_category: "metals".to_string(),
                    component_type: "caption".to_string(),
                    params: GenParams::with_temperature(0.8),
                    attempt_number: 1,
                    generated_text: "text".to_string(),
                    ai_score: 0.45,
                    human_score: 0.55,
                    readability_score: None,
                    success: true,
                    failure_type: None,
                })
                .await
                .unwrap();
        }

        let advisor = TemperatureAdvisor::new(store, LearningConfig::default());
        let advice = advisor.recommend("metals", "caption", 0.7).await.unwrap();
        assert!((advice.temperature - 0.60).abs() < 1e-9);
    }
}
