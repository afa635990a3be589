//! Weighted detection ensemble
//!
//! Composes the local detector with the optional external detector via
//! a weighted blend. The cost-control mode decides when the external
//! detector is consulted; texts below its minimum input length are
//! scored locally regardless of mode.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{DetectionConfig, ExternalUsageMode};

use super::{DetectionScore, Detector, ExternalDetector, LocalDetector};

/// The detection ensemble the orchestrator runs on every candidate.
pub struct DetectionEnsemble {
    local: LocalDetector,
    external: Option<Arc<dyn Detector>>,
    mode: ExternalUsageMode,
    smart_local_attempts: u32,
    min_external_chars: usize,
    local_blend: f64,
    external_blend: f64,
}

impl DetectionEnsemble {
    pub fn from_config(config: &DetectionConfig) -> Self {
        let external: Option<Arc<dyn Detector>> = if config.mode == ExternalUsageMode::Disabled {
            None
        } else {
            ExternalDetector::from_config(&config.external)
                .map(|d| Arc::new(d) as Arc<dyn Detector>)
        };

        Self {
            local: LocalDetector::new(config.weights.clone()),
            external,
            mode: config.mode,
            smart_local_attempts: config.smart_local_attempts,
            min_external_chars: config.external.min_input_chars,
            // External reliability is higher but metered; its share is
            // bounded to keep the local signal in the blend.
            local_blend: config.local_blend.clamp(0.0, 1.0),
            external_blend: config.external_blend.clamp(0.5, 0.8),
        }
    }

    /// Test/audit constructor with an explicit external detector.
    pub fn with_external(
        local: LocalDetector,
        external: Option<Arc<dyn Detector>>,
        config: &DetectionConfig,
    ) -> Self {
        Self {
            local,
            external,
            mode: config.mode,
            smart_local_attempts: config.smart_local_attempts,
            min_external_chars: config.external.min_input_chars,
            local_blend: config.local_blend.clamp(0.0, 1.0),
            external_blend: config.external_blend.clamp(0.5, 0.8),
        }
    }

    /// Whether this detection run will consult the external detector.
    /// Pure decision so it can be tested without network access.
    pub fn uses_external(&self, attempt_number: u32, final_check: bool, text_chars: usize) -> bool {
        if self.external.is_none() {
            return false;
        }
        // Short texts are exempt from the usage-mode decision entirely.
        if text_chars < self.min_external_chars {
            return false;
        }
        match self.mode {
            ExternalUsageMode::Disabled => false,
            ExternalUsageMode::Always => true,
            ExternalUsageMode::FinalOnly => final_check,
            ExternalUsageMode::Smart => final_check || attempt_number > self.smart_local_attempts,
        }
    }

    /// True when acceptance requires a second pass with the external
    /// detector after the local score cleared the threshold.
    pub fn needs_final_confirmation(&self, attempt_number: u32, text_chars: usize) -> bool {
        self.uses_external(attempt_number, true, text_chars)
            && !self.uses_external(attempt_number, false, text_chars)
    }

    /// Run the ensemble. Deterministic for fixed text and availability.
    pub async fn detect(
        &self,
        text: &str,
        attempt_number: u32,
        final_check: bool,
    ) -> Result<DetectionScore> {
        let local = self.local.score(text);
        let text_chars = text.chars().count();

        if self.uses_external(attempt_number, final_check, text_chars) {
            let external = self
                .external
                .as_ref()
                .expect("uses_external checked availability");
            match external.detect(text).await {
                Ok(ext) => {
                    let w = self.external_blend;
                    let ai_score = w * ext.ai_score + (1.0 - w) * local.ai_score;
                    debug!(
                        attempt_number,
                        local = local.ai_score,
                        external = ext.ai_score,
                        blended = ai_score,
                        "ensemble blended external score"
                    );
                    return Ok(DetectionScore {
                        ai_score: ai_score.clamp(0.0, 1.0),
                        // Local sentence scores drive failure classification;
                        // external providers rarely return them.
                        sentence_scores: local.sentence_scores,
                        method: "local+external".to_string(),
                    });
                }
                Err(e) => {
                    warn!("external detector failed, falling back to local blend: {e:#}");
                }
            }
        }

        let baseline = self.local.baseline_score(text);
        let ai_score = self.local_blend * local.ai_score + (1.0 - self.local_blend) * baseline;
        Ok(DetectionScore {
            ai_score: ai_score.clamp(0.0, 1.0),
            sentence_scores: local.sentence_scores,
            method: "local+baseline".to_string(),
        })
    }
}
