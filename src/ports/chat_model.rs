//! Chat Model Port - capability contract for LLM provider integrations.
//!
//! A [`ChatModel`] opens provider-specific [`ChatSession`]s behind a uniform
//! two-method contract: `send` a user turn, then optionally continue the same
//! logical turn with `send_tool_results`. Sessions own the system
//! instruction, the accumulated message history (seeded from caller history),
//! the translated tool declarations, and generation parameters.
//!
//! # Ordering invariant
//!
//! On success a session appends exactly one user entry and exactly one
//! assistant entry (or one assistant tool-call entry, then tool-result
//! entries, then one assistant entry) to its internal history, in that order.
//!
//! # Cancellation
//!
//! Every network-bound method takes a caller-supplied cancellation token.
//! An aborted call surfaces [`ModelError::Cancelled`]; implementations must
//! never swallow a cancellation as a retryable failure.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::TierConfig;
use crate::domain::{Attachment, ConversationMessage, ToolCallRequest, ToolDeclaration, ToolResult};

/// Port for an LLM provider backend.
pub trait ChatModel: Send + Sync {
    /// Opens a new session for one conversation turn-exchange.
    fn open_session(&self, params: SessionParams) -> Box<dyn ChatSession>;

    /// Provider and model identification.
    fn model_info(&self) -> ModelInfo;
}

/// One provider-backed conversation turn-exchange.
#[async_trait]
pub trait ChatSession: Send {
    /// Sends the user turn and returns the assistant's text and/or tool-call
    /// requests.
    async fn send(
        &mut self,
        turn: UserTurn,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError>;

    /// Continues the turn that produced tool calls with their results.
    ///
    /// Calling this without a preceding `send` that produced tool calls is a
    /// programmer error and fails with [`ModelError::SessionState`].
    async fn send_tool_results(
        &mut self,
        results: Vec<ToolResult>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError>;

    /// The session's accumulated message history.
    fn history(&self) -> &[ConversationMessage];
}

/// Resolves the [`ChatModel`] adapter serving a configured tier.
pub trait ModelResolver: Send + Sync {
    /// Returns the adapter for `tier`, constructing or reusing a cached
    /// client.
    fn resolve(&self, tier: &TierConfig) -> Result<Arc<dyn ChatModel>, ResolveError>;
}

/// Parameters for opening a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// System instruction guiding model behavior.
    pub system_instruction: String,
    /// Prior conversation turns seeding the session history.
    pub history: Vec<ConversationMessage>,
    /// Tool declarations advertised to the model.
    pub tools: Vec<ToolDeclaration>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Output token cap for this session.
    pub max_output_tokens: Option<u32>,
}

impl SessionParams {
    /// Creates session parameters with the given system instruction.
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            history: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            max_output_tokens: None,
        }
    }

    /// Seeds the session with prior conversation turns.
    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Advertises tool declarations to the model.
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Caps the output token count.
    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// The user side of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTurn {
    /// Message text.
    pub text: String,
    /// Zero or more attachments to embed provider-natively.
    pub attachments: Vec<Attachment>,
}

impl UserTurn {
    /// Creates a text-only turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Creates a turn carrying attachments.
    pub fn with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            text: text.into(),
            attachments,
        }
    }
}

/// What the model produced for one exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Free-form assistant text (may embed the textual function-call
    /// protocol).
    pub text: String,
    /// Structured tool-call requests, if the provider supports them.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl TurnOutcome {
    /// Creates a text-only outcome.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Returns true if the model requested tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Provider identification and capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Provider name, e.g. "gemini" or "gateway".
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Whether the provider returns structured tool calls.
    pub supports_native_tools: bool,
    /// Whether the provider accepts multimodal content.
    pub supports_multimodal: bool,
}

impl ModelInfo {
    /// Creates provider info with both capabilities enabled.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            supports_native_tools: true,
            supports_multimodal: true,
        }
    }

    /// Sets native tool-calling support.
    pub fn with_native_tools(mut self, supports: bool) -> Self {
        self.supports_native_tools = supports;
        self
    }

    /// Sets multimodal support.
    pub fn with_multimodal(mut self, supports: bool) -> Self {
        self.supports_multimodal = supports;
        self
    }
}

/// Errors raised at the provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Error body or message.
        message: String,
    },

    /// Transport-level failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u32,
    },

    /// The provider response could not be decoded.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// The session was driven out of order.
    #[error("invalid session state: {0}")]
    SessionState(String),

    /// The caller cancelled the in-flight call.
    #[error("cancelled")]
    Cancelled,
}

impl ModelError {
    /// Creates an upstream error from a status code and body.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a session-state error.
    pub fn session_state(message: impl Into<String>) -> Self {
        Self::SessionState(message.into())
    }
}

/// Errors resolving a tier to an adapter.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The tier's provider has no configured credential.
    #[error("no credential configured for provider {provider}")]
    MissingCredential {
        /// Provider name.
        provider: String,
    },

    /// The adapter's HTTP client could not be constructed.
    #[error("failed to build provider client: {0}")]
    ClientBuild(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_params_builder_works() {
        let params = SessionParams::new("be helpful")
            .with_history(vec![ConversationMessage::user("hi")])
            .with_tools(vec![ToolDeclaration::new(
                "ping",
                "ping",
                serde_json::json!({"type": "object"}),
            )])
            .with_temperature(0.4)
            .with_max_output_tokens(2048);

        assert_eq!(params.system_instruction, "be helpful");
        assert_eq!(params.history.len(), 1);
        assert_eq!(params.tools.len(), 1);
        assert_eq!(params.temperature, Some(0.4));
        assert_eq!(params.max_output_tokens, Some(2048));
    }

    #[test]
    fn turn_outcome_reports_tool_calls() {
        let outcome = TurnOutcome::text("hello");
        assert!(!outcome.has_tool_calls());

        let outcome = TurnOutcome {
            text: String::new(),
            tool_calls: vec![ToolCallRequest::new("ping", serde_json::json!({}))],
        };
        assert!(outcome.has_tool_calls());
    }

    #[test]
    fn model_error_displays() {
        let err = ModelError::upstream(429, "quota exceeded");
        assert_eq!(err.to_string(), "provider returned 429: quota exceeded");

        let err = ModelError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "request timed out after 30s");
    }
}
