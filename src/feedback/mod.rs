//! Append-only feedback history
//!
//! Every generation attempt lands here exactly once, never to be
//! updated. The learning advisors read this history; human corrections
//! reference attempts without mutating them.

pub mod store;

pub use store::{
    AttemptFilter, AttemptRecord, CorrectionRecord, FeedbackStore, NewAttempt,
    SentenceScoreRow, TemperatureBucket,
};
