//! Closed-loop generation orchestration
//!
//! The engine ties the completion backend, detection ensemble,
//! readability validator, and feedback advisors into one retry loop.
//! Curriculum thresholds and failure-specific parameter deltas live in
//! their own modules so they stay testable in isolation.

pub mod adjust;
pub mod curriculum;
pub mod engine;

pub use adjust::{apply_failure_deltas, apply_readability_nudge, classify_failure};
pub use curriculum::Curriculum;
pub use engine::{GenerationRequest, Orchestrator};
