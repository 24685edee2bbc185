//! LLM provider trait — the core abstraction for completions.
//!
//! All backends (Anthropic, OpenAI) implement this trait. Uses `BoxFuture`
//! for object safety so the backend can hold a `Box<dyn LlmProvider>`.

use crate::BoxFuture;

use super::types::{ChatRequest, ChatResponse};

/// Errors from LLM provider calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("authentication failed (check API key): {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider error: {status} — {message}")]
    Provider { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

/// Core trait for LLM providers.
///
/// Implementations must be `Send + Sync` for use in the async backend.
pub trait LlmProvider: Send + Sync {
    /// Provider display name (e.g. "anthropic", "openai").
    fn name(&self) -> &str;

    /// Whether a credential is present for this provider.
    fn has_credential(&self) -> bool;

    /// Perform a completion.
    fn complete(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;
}
