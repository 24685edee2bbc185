//! LLM provider integration.
//!
//! The backend owns one provider session and dispatches through the
//! [`provider::LlmProvider`] trait. Providers translate a prepared chat
//! request into the vendor wire format; none of them know anything about
//! the shell's own `cmd:` / `edit:` grammar — that constraint lives in the
//! system prompt the backend builds.

pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod types;

pub use provider::{LlmError, LlmProvider};
pub use types::{ChatMessage, ChatRequest, ChatResponse};

use hermsh_config::Provider;

/// Construct the provider selected by configuration.
///
/// The credential is read from the provider's environment variable; a
/// missing credential is reported as an auth error at call time, not here,
/// so the shell can start without AI and degrade gracefully.
pub fn build_provider(kind: Provider, model: Option<&str>) -> Box<dyn LlmProvider> {
    let api_key = std::env::var(kind.credential_env()).unwrap_or_default();
    match kind {
        Provider::Anthropic => {
            let mut p = anthropic::AnthropicProvider::new(api_key);
            if let Some(model) = model {
                p = p.with_model(model);
            }
            Box::new(p)
        }
        Provider::OpenAi => {
            let mut p = openai::OpenAiProvider::new(api_key);
            if let Some(model) = model {
                p = p.with_model(model);
            }
            Box::new(p)
        }
    }
}
