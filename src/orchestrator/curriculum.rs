//! Curriculum thresholds
//!
//! The acceptance threshold tightens as the rolling success rate rises.
//! With no history at all the lenient base threshold applies, so a
//! fresh installation can make progress instead of failing everything.

use crate::config::CurriculumConfig;

/// Maps a rolling success rate to the active AI-likeness threshold.
pub struct Curriculum {
    config: CurriculumConfig,
}

impl Curriculum {
    pub fn new(config: CurriculumConfig) -> Self {
        Self { config }
    }

    /// Active threshold for the given rolling success rate. `None`
    /// means no scored history yet.
    pub fn threshold_for(&self, success_rate: Option<f64>) -> f64 {
        let Some(rate) = success_rate else {
            return self.config.base_allowed_ai_score;
        };
        // Breakpoints are sorted by success rate descending, so the
        // first match is the strictest applicable threshold.
        for bp in &self.config.breakpoints {
            if rate >= bp.min_success_rate {
                return bp.allowed_ai_score;
            }
        }
        self.config.base_allowed_ai_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let curriculum = Curriculum::new(CurriculumConfig::default());
        assert_eq!(curriculum.threshold_for(None), 0.60);
        assert_eq!(curriculum.threshold_for(Some(0.05)), 0.60);
        assert_eq!(curriculum.threshold_for(Some(0.10)), 0.30);
        assert_eq!(curriculum.threshold_for(Some(0.20)), 0.30);
        assert_eq!(curriculum.threshold_for(Some(0.30)), 0.20);
        assert_eq!(curriculum.threshold_for(Some(0.95)), 0.20);
    }

    #[test]
    fn test_threshold_never_loosens_as_success_rises() {
        let curriculum = Curriculum::new(CurriculumConfig::default());
        let mut prev = f64::INFINITY;
        for step in 0..=100 {
            let rate = step as f64 / 100.0;
            let threshold = curriculum.threshold_for(Some(rate));
            assert!(
                threshold <= prev,
                "threshold loosened at success rate {rate}: {threshold} > {prev}"
            );
            prev = threshold;
        }
    }

    #[test]
    fn test_empty_breakpoints_always_base() {
        let curriculum = Curriculum::new(CurriculumConfig {
            window: 50,
            breakpoints: vec![],
            base_allowed_ai_score: 0.45,
        });
        assert_eq!(curriculum.threshold_for(Some(0.99)), 0.45);
        assert_eq!(curriculum.threshold_for(None), 0.45);
    }
}
