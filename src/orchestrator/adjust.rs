//! Failure classification and parameter adjustment
//!
//! A rejected attempt is classified from its per-sentence score
//! distribution, and each failure class maps to a fixed set of
//! parameter deltas for the next attempt. Deltas are clamped back into
//! valid ranges after application.

use crate::config::FailureClassifierConfig;
use crate::detection::SentenceScore;
use crate::readability::ReadabilityStatus;
use crate::types::{FailureType, GenParams};

/// Classify a rejected attempt. Uniform is checked before borderline:
/// a flat, high distribution is uniform even when the composite lands
/// near the threshold.
pub fn classify_failure(
    composite: f64,
    threshold: f64,
    sentence_scores: &[SentenceScore],
    config: &FailureClassifierConfig,
) -> FailureType {
    let (mean, spread) = score_distribution(sentence_scores, composite);

    if mean >= config.uniform_mean && spread <= config.uniform_spread {
        FailureType::Uniform
    } else if composite - threshold <= config.borderline_band {
        FailureType::Borderline
    } else {
        FailureType::Partial
    }
}

/// Mean and standard deviation of the sentence scores. With no
/// per-sentence data the composite stands in, with zero spread.
fn score_distribution(scores: &[SentenceScore], composite: f64) -> (f64, f64) {
    if scores.is_empty() {
        return (composite, 0.0);
    }
    let n = scores.len() as f64;
    let mean = scores.iter().map(|s| s.score).sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s.score - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Apply the delta rule for a failure class.
///
/// Uniform failures push hard toward looseness: more temperature, more
/// grammatical irregularity, fewer facts crowding the prose. Borderline
/// failures back temperature off slightly and vary the rhythm. Partial
/// failures warm up moderately and lean harder on grounding.
pub fn apply_failure_deltas(params: &mut GenParams, failure: FailureType) {
    match failure {
        FailureType::Uniform => {
            params.temperature += 0.15;
            params.persona.irregularity += 0.20;
            params.enrichment.fact_density -= 0.20;
        }
        FailureType::Borderline => {
            params.temperature -= 0.05;
            params.persona.rhythm_variation += 0.15;
        }
        FailureType::Partial => {
            params.temperature += 0.08;
            params.enrichment.contextual_grounding += 0.20;
        }
    }
    params.clamp();
}

/// Small correction when detection passed but readability did not.
pub fn apply_readability_nudge(params: &mut GenParams, status: ReadabilityStatus) {
    match status {
        ReadabilityStatus::TooHard => {
            params.temperature += 0.03;
            params.persona.rhythm_variation += 0.10;
        }
        ReadabilityStatus::TooEasy => {
            params.enrichment.fact_density += 0.10;
        }
        ReadabilityStatus::Pass | ReadabilityStatus::Disabled => {}
    }
    params.clamp();
}

/// Apply a predictor-suggested delta addressed by parameter path.
/// Unknown paths are ignored.
pub fn apply_named_delta(params: &mut GenParams, parameter: &str, delta: f64) {
    match parameter {
        "temperature" => params.temperature += delta,
        "persona.irregularity" => params.persona.irregularity += delta,
        "persona.rhythm_variation" => params.persona.rhythm_variation += delta,
        "enrichment.fact_density" => params.enrichment.fact_density += delta,
        "enrichment.contextual_grounding" => params.enrichment.contextual_grounding += delta,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[f64]) -> Vec<SentenceScore> {
        values
            .iter()
            .map(|&score| SentenceScore {
                sentence: "s".to_string(),
                score,
            })
            .collect()
    }

    #[test]
    fn test_flat_high_distribution_is_uniform() {
        let config = FailureClassifierConfig::default();
        let failure = classify_failure(0.95, 0.6, &scores(&[0.94, 0.96, 0.95, 0.93]), &config);
        assert_eq!(failure, FailureType::Uniform);
    }

    #[test]
    fn test_mixed_distribution_is_partial() {
        let config = FailureClassifierConfig::default();
        // Some sentences human-like, some machine-like; composite well
        // above the threshold band
        let failure = classify_failure(0.75, 0.6, &scores(&[0.2, 0.95, 0.3, 0.9]), &config);
        assert_eq!(failure, FailureType::Partial);
    }

    #[test]
    fn test_near_threshold_is_borderline() {
        let config = FailureClassifierConfig::default();
        let failure = classify_failure(0.65, 0.6, &scores(&[0.5, 0.7, 0.75]), &config);
        assert_eq!(failure, FailureType::Borderline);
    }

    #[test]
    fn test_uniform_wins_over_borderline_band() {
        let config = FailureClassifierConfig::default();
        // Flat and high, yet composite only 0.05 above threshold
        let failure = classify_failure(0.88, 0.83, &scores(&[0.88, 0.87, 0.89]), &config);
        assert_eq!(failure, FailureType::Uniform);
    }

    #[test]
    fn test_no_sentence_scores_uses_composite() {
        let config = FailureClassifierConfig::default();
        assert_eq!(classify_failure(0.95, 0.6, &[], &config), FailureType::Uniform);
        assert_eq!(classify_failure(0.64, 0.6, &[], &config), FailureType::Borderline);
    }

    #[test]
    fn test_uniform_delta_escapes_low_temperature() {
        // A hard uniform failure at 0.6 must land at or above 0.70 on
        // the next attempt
        let mut params = GenParams::with_temperature(0.6);
        apply_failure_deltas(&mut params, FailureType::Uniform);
        assert!(params.temperature >= 0.70);
        assert!(params.persona.irregularity > 0.3);
        assert!(params.enrichment.fact_density < 0.6);
    }

    #[test]
    fn test_borderline_delta_cools_and_varies_rhythm() {
        let mut params = GenParams::with_temperature(0.7);
        apply_failure_deltas(&mut params, FailureType::Borderline);
        assert!((params.temperature - 0.65).abs() < 1e-9);
        assert!((params.persona.rhythm_variation - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_deltas_stay_clamped() {
        let mut params = GenParams::with_temperature(1.45);
        params.persona.irregularity = 0.95;
        apply_failure_deltas(&mut params, FailureType::Uniform);
        assert_eq!(params.temperature, 1.5);
        assert_eq!(params.persona.irregularity, 1.0);
    }

    #[test]
    fn test_named_delta_addressing() {
        let mut params = GenParams::default();
        apply_named_delta(&mut params, "temperature", -0.1);
        apply_named_delta(&mut params, "persona.irregularity", 0.2);
        apply_named_delta(&mut params, "unknown.path", 5.0);
        assert!((params.temperature - 0.6).abs() < 1e-9);
        assert!((params.persona.irregularity - 0.5).abs() < 1e-9);
    }
}
