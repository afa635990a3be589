//! N-gram pattern mining over generated texts
//!
//! Extracts word n-grams from historical attempts and tracks how often
//! each pattern appears in failures versus successes. Patterns above
//! the fail-rate high-water mark become a blacklist injected into
//! future prompts as negative examples; high-success patterns become
//! positive reinforcement. Aggregates are recomputed in full on every
//! pass, never incrementally mutated, so results cannot drift with
//! processing order.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

use crate::config::LearningConfig;
use crate::feedback::{AttemptFilter, FeedbackStore};

/// One mined pattern with its outcome counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAggregate {
    pub pattern: String,
    /// Number of attempts whose text contains the pattern
    pub occurrences: u32,
    pub failures: u32,
    pub successes: u32,
    pub fail_rate: f64,
    pub success_rate: f64,
}

/// Output of one learning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReport {
    pub risky_patterns: Vec<PatternAggregate>,
    pub safe_patterns: Vec<PatternAggregate>,
    pub recommendations: Vec<String>,
}

/// Batch pattern learner over the feedback store.
pub struct PatternLearner {
    store: Arc<FeedbackStore>,
    config: LearningConfig,
}

impl PatternLearner {
    pub fn new(store: Arc<FeedbackStore>, config: LearningConfig) -> Self {
        Self { store, config }
    }

    /// Run a full learning pass. Pure function of the stored data: two
    /// runs over an unchanged store yield identical reports.
    pub async fn learn(
        &self,
        topic_filter: Option<&str>,
        component_filter: Option<&str>,
    ) -> Result<PatternReport> {
        let attempts = self
            .store
            .query_attempts(&AttemptFilter {
                topic: topic_filter.map(|s| s.to_string()),
                component_type: component_filter.map(|s| s.to_string()),
                ..AttemptFilter::default()
            })
            .await?;

        // BTreeMap keeps iteration order independent of insertion order.
        let mut counts: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for attempt in &attempts {
            for pattern in extract_ngrams(
                &attempt.generated_text,
                self.config.ngram_min,
                self.config.ngram_max,
            ) {
                let entry = counts.entry(pattern).or_insert((0, 0));
                entry.0 += 1;
                if !attempt.success {
                    entry.1 += 1;
                }
            }
        }

        let mut risky = Vec::new();
        let mut safe = Vec::new();
        for (pattern, (occurrences, failures)) in counts {
            if occurrences < self.config.min_pattern_occurrences {
                continue;
            }
            let successes = occurrences - failures;
            let aggregate = PatternAggregate {
                fail_rate: failures as f64 / occurrences as f64,
                success_rate: successes as f64 / occurrences as f64,
                pattern,
                occurrences,
                failures,
                successes,
            };
            if aggregate.fail_rate >= self.config.blacklist_fail_rate {
                risky.push(aggregate);
            } else if aggregate.success_rate >= self.config.safe_success_rate {
                safe.push(aggregate);
            }
        }

        risky.sort_by(|a, b| {
            b.fail_rate
                .partial_cmp(&a.fail_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.occurrences.cmp(&a.occurrences))
                .then(a.pattern.cmp(&b.pattern))
        });
        safe.sort_by(|a, b| {
            b.success_rate
                .partial_cmp(&a.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.occurrences.cmp(&a.occurrences))
                .then(a.pattern.cmp(&b.pattern))
        });

        let mut recommendations = Vec::new();
        if let Some(worst) = risky.first() {
            recommendations.push(format!(
                "avoid \"{}\" ({} of {} attempts containing it failed)",
                worst.pattern, worst.failures, worst.occurrences
            ));
        }
        if let Some(best) = safe.first() {
            recommendations.push(format!(
                "phrasing like \"{}\" succeeded in {} of {} attempts",
                best.pattern, best.successes, best.occurrences
            ));
        }

        info!(
            attempts = attempts.len(),
            risky = risky.len(),
            safe = safe.len(),
            "pattern learning pass complete"
        );

        Ok(PatternReport {
            risky_patterns: risky,
            safe_patterns: safe,
            recommendations,
        })
    }

    /// Current prompt blacklist: risky pattern strings, capped.
    pub async fn blacklist(
        &self,
        topic_filter: Option<&str>,
        component_filter: Option<&str>,
    ) -> Result<Vec<String>> {
        let report = self.learn(topic_filter, component_filter).await?;
        Ok(report
            .risky_patterns
            .into_iter()
            .take(self.config.max_blacklist)
            .map(|p| p.pattern)
            .collect())
    }
}

/// Distinct word n-grams of the given length range. Each pattern is
/// counted once per text regardless of repetition inside it.
fn extract_ngrams(text: &str, min_len: usize, max_len: usize) -> BTreeSet<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut ngrams = BTreeSet::new();
    for n in min_len..=max_len.min(words.len()) {
        for window in words.windows(n) {
            ngrams.insert(window.join(" "));
        }
    }
    ngrams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::NewAttempt;
    use crate::types::GenParams;

    async fn seed_text(store: &FeedbackStore, text: &str, success: bool) {
        store
            .append_attempt(&NewAttempt {
                topic: "Aluminum".to_string(),
                topic_category: "metals".to_string(),
                component_type: "caption".to_string(),
                params: GenParams::default(),
                attempt_number: 1,
                generated_text: text.to_string(),
                ai_score: if success { 0.2 } else { 0.9 },
                human_score: if success { 0.8 } else { 0.1 },
                readability_score: None,
                success,
                failure_type: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_extract_ngrams_counts_once_per_text() {
        let ngrams = extract_ngrams("the metal the metal", 2, 3);
        assert!(ngrams.contains("the metal"));
        assert!(ngrams.contains("metal the"));
        // Repetition inside one text does not duplicate entries
        assert_eq!(ngrams.iter().filter(|n| n.as_str() == "the metal").count(), 1);
    }

    #[tokio::test]
    async fn test_high_fail_rate_patterns_become_risky() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        for _ in 0..4 {
            seed_text(&store, "plays a crucial role in industry", false).await;
        }
        for _ in 0..4 {
            seed_text(&store, "we bend it all day long", true).await;
        }

        let learner = PatternLearner::new(store, LearningConfig::default());
        let report = learner.learn(None, None).await.unwrap();

        assert!(report
            .risky_patterns
            .iter()
            .any(|p| p.pattern == "plays a crucial role"));
        assert!(report
            .safe_patterns
            .iter()
            .any(|p| p.pattern == "we bend it"));
        assert!(!report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_learn_is_pure_over_unchanged_store() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        seed_text(&store, "unlock the potential of aluminum today", false).await;
        seed_text(&store, "unlock the potential of aluminum today", false).await;
        seed_text(&store, "unlock the potential of aluminum today", false).await;
        seed_text(&store, "honestly it just works for us", true).await;
        seed_text(&store, "honestly it just works for us", true).await;
        seed_text(&store, "honestly it just works for us", true).await;

        let learner = PatternLearner::new(store, LearningConfig::default());
        let first = learner.learn(None, None).await.unwrap();
        let second = learner.learn(None, None).await.unwrap();

        assert_eq!(first.risky_patterns, second.risky_patterns);
        assert_eq!(first.safe_patterns, second.safe_patterns);
        assert_eq!(first.recommendations, second.recommendations);
    }

    #[tokio::test]
    async fn test_rare_patterns_ignored() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        seed_text(&store, "a one-off failing phrase", false).await;

        let learner = PatternLearner::new(store, LearningConfig::default());
        let report = learner.learn(None, None).await.unwrap();
        assert!(report.risky_patterns.is_empty());
    }

    #[tokio::test]
    async fn test_blacklist_is_capped() {
        let store = Arc::new(FeedbackStore::in_memory().unwrap());
        for _ in 0..3 {
            seed_text(
                &store,
                "one two three four five six seven eight nine ten eleven twelve",
                false,
            )
            .await;
        }

        let config = LearningConfig {
            max_blacklist: 5,
            ..LearningConfig::default()
        };
        let learner = PatternLearner::new(store, config);
        let blacklist = learner.blacklist(None, None).await.unwrap();
        assert_eq!(blacklist.len(), 5);
    }
}
