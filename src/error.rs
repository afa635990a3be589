//! Error taxonomy for the generation loop
//!
//! Four classes with distinct recovery semantics: transport errors are
//! retried with backoff before surfacing, detection exhaustion surfaces
//! with full diagnostics, store failures degrade learning instead of
//! blocking generation, and configuration errors abort before the
//! first attempt.

use thiserror::Error;

use crate::types::{FailureType, GenParams};

/// Scores and parameters of the last attempt, attached to exhaustion
/// failures so a human can diagnose what the loop tried.
#[derive(Debug, Clone)]
pub struct AttemptDiagnostics {
    pub ai_score: f64,
    pub readability_score: Option<f64>,
    pub params: GenParams,
    pub failure_type: Option<FailureType>,
    pub threshold: f64,
}

impl std::fmt::Display for AttemptDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ai_score={:.3} threshold={:.2} temperature={:.2} failure={}",
            self.ai_score,
            self.threshold,
            self.params.temperature,
            self.failure_type
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string()),
        )
    }
}

/// Error taxonomy for a generation request.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// External service unreachable after bounded backoff retries.
    #[error("completion service unreachable: {0}")]
    Transport(String),

    /// Every attempt scored above the active threshold.
    #[error("detection threshold exhausted after {attempts} attempts ({diagnostics})")]
    DetectionExhausted {
        attempts: u32,
        diagnostics: AttemptDiagnostics,
    },

    /// Feedback store unreachable. Generation proceeds without learning;
    /// this only surfaces from commands whose whole purpose is the store.
    #[error("feedback store unavailable: {0}")]
    StoreUnavailable(String),

    /// Missing or invalid persona/spec/config data. Fatal before any attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wall-clock bound on the whole multi-attempt loop, distinct from
    /// threshold exhaustion.
    #[error("generation timed out after {elapsed_secs}s")]
    Timeout { elapsed_secs: u64 },
}

impl GenerationError {
    /// Process exit code for the owned command surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerationError::DetectionExhausted { .. } => 1,
            GenerationError::Transport(_) => 2,
            GenerationError::StoreUnavailable(_) => 3,
            GenerationError::Configuration(_) => 4,
            GenerationError::Timeout { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let diag = AttemptDiagnostics {
            ai_score: 0.9,
            readability_score: None,
            params: GenParams::default(),
            failure_type: Some(FailureType::Uniform),
            threshold: 0.6,
        };
        assert_eq!(
            GenerationError::DetectionExhausted { attempts: 5, diagnostics: diag }.exit_code(),
            1
        );
        assert_eq!(GenerationError::Transport("down".into()).exit_code(), 2);
        assert_eq!(GenerationError::StoreUnavailable("locked".into()).exit_code(), 3);
        assert_eq!(GenerationError::Configuration("no persona".into()).exit_code(), 4);
    }

    #[test]
    fn test_exhaustion_message_carries_diagnostics() {
        let diag = AttemptDiagnostics {
            ai_score: 0.912,
            readability_score: Some(71.0),
            params: GenParams::with_temperature(0.85),
            failure_type: Some(FailureType::Partial),
            threshold: 0.6,
        };
        let err = GenerationError::DetectionExhausted { attempts: 5, diagnostics: diag };
        let msg = err.to_string();
        assert!(msg.contains("0.912"));
        assert!(msg.contains("partial"));
        assert!(msg.contains("0.85"));
    }
}
