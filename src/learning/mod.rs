//! Feedback-learning subsystem
//!
//! Three read-only advisors over the append-only attempt history:
//! temperature recommendation, n-gram pattern mining, and success
//! prediction. All of them recompute from stored rows on demand; none
//! keeps mutable state of its own.

pub mod patterns;
pub mod predictor;
pub mod temperature;

pub use patterns::{PatternAggregate, PatternLearner, PatternReport};
pub use predictor::{ParamDelta, Prediction, Recommendation, SuccessPredictor};
pub use temperature::{Confidence, TemperatureAdvice, TemperatureAdvisor};
