//! External text-completion service
//!
//! The completion model is an opaque black box behind an
//! OpenAI-compatible API. The orchestrator talks to it through the
//! `CompletionBackend` trait so the attempt loop can be tested without
//! network access.

pub mod client;

pub use client::{classify_status, CompletionError, HttpCompletionClient};

use async_trait::async_trait;

/// One completion request. The nonce is injected into request metadata
/// so identical prompts from adaptive retries can never be collapsed by
/// a response cache along the way.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub nonce: String,
}

/// A text-completion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}
