//! AI-likeness detection ensemble
//!
//! A dependency-free local detector always runs; a paid external
//! detector is consulted according to the configured cost-control mode.
//! Scores are deterministic for a fixed text and fixed detector
//! availability.

pub mod ensemble;
pub mod external;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ensemble::DetectionEnsemble;
pub use external::ExternalDetector;
pub use local::LocalDetector;

/// Result of scoring one text for AI-likeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionScore {
    /// Composite AI-likeness, 0.0 (human) to 1.0 (machine)
    pub ai_score: f64,
    /// Per-sentence scores in document order
    pub sentence_scores: Vec<SentenceScore>,
    /// Which detectors contributed
    pub method: String,
}

/// One sentence with its AI-likeness estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceScore {
    pub sentence: String,
    pub score: f64,
}

/// A single detection capability. The ensemble composes these with a
/// weighted blend instead of scattering detector conditionals through
/// the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;
    async fn detect(&self, text: &str) -> Result<DetectionScore>;
}
