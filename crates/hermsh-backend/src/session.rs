//! AI session: provider lifecycle and query translation.
//!
//! The session maps a raw user line (plus optional failure context) to
//! exactly one of the two reply shapes the front end understands —
//! `cmd:<command>` or `edit:<text>`. The grammar constraint lives in the
//! system prompt; whatever the model returns outside the grammar is
//! wrapped as informational text.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use hermsh_config::{Config, Provider};
use hermsh_core::llm::{build_provider, ChatMessage, ChatRequest, LlmProvider};
use hermsh_core::protocol::Reply;

/// Lifecycle of the AI session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiStatus {
    Loading,
    Ready,
    Failed,
}

/// Captured context from a failed command, forwarded with the query.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub exit_code: i32,
    pub output: String,
}

const SYSTEM_PROMPT: &str = "\
You are the AI engine of an interactive Unix shell. The user typed a line \
that is not a working shell command, or asked a question in natural \
language. Respond with exactly one of:\n\
\n\
cmd:<a single-line shell command the user should run>\n\
edit:<informational text for the user>\n\
\n\
Use `cmd:` only when one concrete command solves the request; never chain \
destructive operations. Use `edit:` for explanations, multi-step guidance, \
or anything that is not a runnable command. Do not add anything before the \
prefix.";

/// The AI-owning session. One per backend process.
pub struct AiSession {
    status: AiStatus,
    /// Why initialization failed, when it did.
    failure: Option<String>,
    provider_kind: Provider,
    model: Option<String>,
    provider: Option<Arc<dyn LlmProvider>>,
    /// Working directory mirrored from the front end.
    cwd: Option<String>,
    /// Rolling window of recent exchanges, oldest first.
    history: VecDeque<ChatMessage>,
}

/// Recent messages kept as conversation context (user + assistant pairs).
const HISTORY_MAX_MESSAGES: usize = 8;

impl AiSession {
    pub fn new(config: &Config) -> Self {
        Self {
            status: AiStatus::Loading,
            failure: None,
            provider_kind: config.provider,
            model: config.model.clone(),
            provider: None,
            cwd: None,
            history: VecDeque::new(),
        }
    }

    /// Bring the provider up. Credential presence decides readiness; the
    /// first real call surfaces anything deeper.
    pub fn initialize(&mut self) {
        let provider: Arc<dyn LlmProvider> =
            Arc::from(build_provider(self.provider_kind, self.model.as_deref()));
        if provider.has_credential() {
            debug!(provider = provider.name(), "AI session ready");
            self.status = AiStatus::Ready;
            self.provider = Some(provider);
        } else {
            let reason = format!(
                "no credential for {} (set {})",
                provider.name(),
                self.provider_kind.credential_env()
            );
            warn!(%reason, "AI session failed to initialize");
            self.status = AiStatus::Failed;
            self.failure = Some(reason);
            self.provider = Some(provider);
        }
    }

    pub fn status(&self) -> AiStatus {
        self.status
    }

    pub fn set_cwd(&mut self, path: String) {
        self.cwd = Some(path);
    }

    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Select a different provider. Takes effect on the next session
    /// initialization, per the wire contract.
    pub fn select_provider(&mut self, kind: Provider) {
        self.provider_kind = kind;
    }

    pub fn provider_kind(&self) -> Provider {
        self.provider_kind
    }

    /// The provider handle for an in-flight call, when ready.
    pub fn provider(&self) -> Option<Arc<dyn LlmProvider>> {
        if self.status == AiStatus::Ready {
            self.provider.clone()
        } else {
            None
        }
    }

    /// Build the provider request for a query: system prompt, recent
    /// exchange history, then the current line.
    pub fn build_request(&self, line: &str, failure: Option<&FailureContext>) -> ChatRequest {
        let mut user = String::new();
        if let Some(cwd) = &self.cwd {
            user.push_str(&format!("Working directory: {cwd}\n"));
        }
        match failure {
            Some(ctx) => {
                user.push_str(&format!(
                    "The user ran this command and it failed:\n{line}\n\
                     Exit code: {}\nCaptured output:\n{}\n",
                    ctx.exit_code, ctx.output
                ));
            }
            None => {
                user.push_str(&format!("User input:\n{line}\n"));
            }
        }

        let mut messages: Vec<ChatMessage> = self.history.iter().cloned().collect();
        messages.push(ChatMessage::user(user));

        ChatRequest {
            model: self.model.clone().unwrap_or_default(),
            messages,
            system: Some(SYSTEM_PROMPT.to_string()),
            ..Default::default()
        }
    }

    /// Remember one completed exchange, dropping the oldest past the cap.
    pub fn record_exchange(&mut self, line: &str, response: &str) {
        self.history.push_back(ChatMessage::user(line));
        self.history.push_back(ChatMessage::assistant(response));
        while self.history.len() > HISTORY_MAX_MESSAGES {
            self.history.pop_front();
        }
    }

    /// The reply to use when the session is not ready.
    pub fn not_ready_reply(&self) -> Reply {
        match self.status {
            AiStatus::Loading => Reply::Edit("AI is still loading, try again shortly".to_string()),
            AiStatus::Failed => Reply::Edit(format!(
                "AI is unavailable: {}",
                self.failure.as_deref().unwrap_or("initialization failed")
            )),
            AiStatus::Ready => Reply::Edit("AI session in an unexpected state".to_string()),
        }
    }
}

/// Map raw model output onto the reply grammar.
///
/// Anything outside the grammar degrades to informational text so a
/// misbehaving model can never break the front end.
pub fn parse_ai_text(text: &str) -> Reply {
    let trimmed = text.trim();
    if let Some(cmd) = trimmed.strip_prefix("cmd:") {
        let cmd = cmd.trim();
        let first_line = cmd.lines().next().unwrap_or_default().trim();
        if !first_line.is_empty() {
            return Reply::Cmd(first_line.to_string());
        }
    }
    if let Some(text) = trimmed.strip_prefix("edit:") {
        return Reply::Edit(text.trim_start().to_string());
    }
    Reply::Edit(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermsh_test_utils::config::TestConfigBuilder;

    #[test]
    fn test_session_fails_without_credential() {
        // The test environment must not carry a real key.
        std::env::remove_var("ANTHROPIC_API_KEY");
        let config = TestConfigBuilder::new().build();
        let mut session = AiSession::new(&config);
        assert_eq!(session.status(), AiStatus::Loading);
        session.initialize();
        assert_eq!(session.status(), AiStatus::Failed);
        assert!(session.provider().is_none());

        match session.not_ready_reply() {
            Reply::Edit(text) => assert!(text.contains("ANTHROPIC_API_KEY")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_build_request_includes_cwd_and_failure() {
        let config = TestConfigBuilder::new().build();
        let mut session = AiSession::new(&config);
        session.set_cwd("/srv/app".to_string());

        let ctx = FailureContext {
            exit_code: 127,
            output: "bash: kubctl: command not found".to_string(),
        };
        let request = session.build_request("kubctl get pods", Some(&ctx));
        let user = &request.messages[0].content;
        assert!(user.contains("/srv/app"));
        assert!(user.contains("Exit code: 127"));
        assert!(user.contains("kubctl: command not found"));
        assert!(request.system.as_deref().unwrap_or("").contains("cmd:"));
    }

    #[test]
    fn test_parse_ai_text_command() {
        assert_eq!(
            parse_ai_text("cmd: kubectl get pods\n"),
            Reply::Cmd("kubectl get pods".to_string())
        );
    }

    #[test]
    fn test_parse_ai_text_edit() {
        assert_eq!(
            parse_ai_text("edit:The command failed because...\nmore detail"),
            Reply::Edit("The command failed because...\nmore detail".to_string())
        );
    }

    #[test]
    fn test_parse_ai_text_off_grammar_degrades() {
        assert_eq!(
            parse_ai_text("Sure! You could try running ls."),
            Reply::Edit("Sure! You could try running ls.".to_string())
        );
    }

    #[test]
    fn test_parse_ai_text_empty_command_degrades() {
        assert_eq!(parse_ai_text("cmd:   "), Reply::Edit("cmd:".to_string()));
    }

    #[test]
    fn test_history_rolls_and_feeds_requests() {
        let config = TestConfigBuilder::new().build();
        let mut session = AiSession::new(&config);

        for i in 0..6 {
            session.record_exchange(&format!("question {i}"), &format!("answer {i}"));
        }
        let request = session.build_request("latest question here", None);
        // Cap plus the new user message.
        assert_eq!(request.messages.len(), HISTORY_MAX_MESSAGES + 1);
        // The oldest exchanges fell off the front.
        assert!(!request.messages[0].content.contains("question 0"));
        assert!(request.messages[0].content.contains("question 2"));
        assert!(request
            .messages
            .last()
            .map(|m| m.content.contains("latest question here"))
            .unwrap_or(false));
    }

    #[test]
    fn test_provider_switch_is_deferred() {
        let config = TestConfigBuilder::new().build();
        let mut session = AiSession::new(&config);
        session.select_provider(Provider::OpenAi);
        assert_eq!(session.provider_kind(), Provider::OpenAi);
        // Not initialized yet — still loading, no live provider swap.
        assert_eq!(session.status(), AiStatus::Loading);
    }
}
