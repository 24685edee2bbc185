//! OpenAI API provider.
//!
//! Implements the [`LlmProvider`] trait for the Chat Completions API
//! (`/v1/chat/completions`).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;

use super::provider::{LlmError, LlmProvider};
use super::types::*;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI provider.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    default_model: String,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given API key.
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

    /// Convert our ChatRequest into OpenAI's API format. The system prompt
    /// becomes the leading message.
    fn build_request_body(&self, request: &ChatRequest) -> OpenAiRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));

        OpenAiRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn has_credential(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn complete(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let body = self.build_request_body(request);
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::Auth("OPENAI_API_KEY is not set".to_string()));
            }
            debug!(model = %body.model, "openai request");

            let resp = self
                .client
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key)
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

            let parsed: OpenAiResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            let text = parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| LlmError::Parse("response contained no choices".to_string()))?;

            Ok(ChatResponse {
                text,
                model: parsed.model,
            })
        })
    }
}

// ── OpenAI wire types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_leads_message_list() {
        let provider = OpenAiProvider::new("key");
        let req = ChatRequest {
            system: Some("be brief".to_string()),
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let body = provider.build_request_body(&req);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
    }

    #[test]
    fn test_response_parse() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"edit:done"}}],"model":"gpt-4o"}"#;
        let parsed: OpenAiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "edit:done");
    }

    #[test]
    fn test_model_override() {
        let provider = OpenAiProvider::new("key").with_model("gpt-4o-mini");
        let body = provider.build_request_body(&ChatRequest::default());
        assert_eq!(body.model, "gpt-4o-mini");
    }
}
