//! Anthropic Claude API provider.
//!
//! Implements the [`LlmProvider`] trait for the Anthropic Messages API
//! (`/v1/messages`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;

use super::provider::{LlmError, LlmProvider};
use super::types::*;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Convert our ChatRequest into Anthropic's API format.
    fn build_request_body(&self, request: &ChatRequest) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        // System prompt rides in its own field; system messages in the
        // conversation are folded into it.
        let system = request.system.clone().or_else(|| {
            request
                .messages
                .iter()
                .find(|m| m.role == "system")
                .map(|m| m.content.clone())
        });

        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| AnthropicMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: Some(request.temperature),
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn has_credential(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn complete(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let body = self.build_request_body(request);
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::Auth("ANTHROPIC_API_KEY is not set".to_string()));
            }
            debug!(model = %body.model, "anthropic request");

            let resp = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(match status.as_u16() {
                    401 | 403 => LlmError::Auth(message),
                    404 => LlmError::ModelNotFound(body.model),
                    429 => LlmError::RateLimited {
                        retry_after_secs: 30,
                    },
                    code => LlmError::Provider {
                        status: code,
                        message,
                    },
                });
            }

            let parsed: AnthropicResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            let text = parsed
                .content
                .iter()
                .filter_map(|block| block.text.as_deref())
                .collect::<Vec<_>>()
                .join("");

            Ok(ChatResponse {
                text,
                model: parsed.model,
            })
        })
    }
}

// ── Anthropic wire types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_uses_default_model() {
        let provider = AnthropicProvider::new("key");
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hello")],
            ..Default::default()
        };
        let body = provider.build_request_body(&req);
        assert_eq!(body.model, DEFAULT_MODEL);
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn test_system_message_lifted_out() {
        let provider = AnthropicProvider::new("key");
        let req = ChatRequest {
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
            ..Default::default()
        };
        let body = provider.build_request_body(&req);
        assert_eq!(body.system.as_deref(), Some("be brief"));
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
    }

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{"content":[{"type":"text","text":"cmd:ls"},{"type":"text","text":" -la"}],"model":"claude-sonnet-4-20250514"}"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "cmd:ls -la");
    }

    #[test]
    fn test_missing_credential_detected() {
        let provider = AnthropicProvider::new("");
        assert!(!provider.has_credential());
    }
}
