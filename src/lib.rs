//! copyforge - Closed-loop website copy generation
//!
//! Generates short marketing copy (captions, subtitles, FAQ answers)
//! through an external completion service, scores every candidate for
//! AI-likeness with a detection ensemble, and retries with
//! failure-specific parameter adjustments until a candidate reads as
//! human-written. Every attempt is persisted to an append-only store
//! that feeds temperature advice, pattern blacklists, and success
//! prediction back into later runs.
//!
//! # Example
//!
//! ```ignore
//! use copyforge::config::Config;
//! use copyforge::orchestrator::{GenerationRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     // build backend, ensemble, validator, store...
//!     # Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod config;
pub mod feedback; // Must come before learning since the advisors read it
pub mod detection;
pub mod readability;
pub mod completion;
pub mod learning;
pub mod prompt;
pub mod orchestrator;
pub mod cli;

// Re-export commonly used types for convenience
pub use completion::{CompletionBackend, CompletionRequest, HttpCompletionClient};

pub use config::Config;

pub use detection::{DetectionEnsemble, DetectionScore, Detector, LocalDetector};

pub use error::GenerationError;

pub use feedback::{AttemptRecord, FeedbackStore, NewAttempt};

pub use orchestrator::{GenerationRequest, Orchestrator};

pub use types::{FailureType, GenParams, GenerationResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Closed-loop copy generation", NAME, VERSION)
}
