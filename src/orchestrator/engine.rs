//! Completion engine - the single inbound surface of the crate.
//!
//! One call to [`CompletionEngine::chat`] covers the whole pipeline:
//! emergency screening, tiered provider dispatch with fallback, the
//! structured tool-call loop, and the textual function-call protocol for
//! providers that narrate their calls instead of structuring them.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::TierConfig;
use crate::domain::{
    extract_function_call, strip_function_call, Attachment, ConversationMessage,
    EmergencyAssessment, EmergencyScreen, ToolCallRequest, ToolResult,
};
use crate::ports::{ModelError, ModelResolver, SessionParams, UserTurn};

use super::fallback::{FallbackError, TieredFallback};
use super::router::ToolRouter;

/// Upper bound on tool-call continuation rounds within one chat turn.
const MAX_TOOL_ROUNDS: usize = 4;

/// Default persona and protocol instruction for complaint handling.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Rail Sahayak, the assistant of an Indian Railways complaint portal. \
Help passengers register complaints, check their complaint status, and \
validate station or train references. Be concise, empathetic, and practical. \
Ask for missing details (category, description) before registering a \
complaint, and quote the complaint reference back to the passenger once \
registered.\n\n\
Prefer the provided tools. If tools are unavailable to you, request an \
action by emitting exactly one line of the form:\n\
FUNCTION_CALL: tool_name({\"arg\": \"value\"})";

/// Instruction used when drafting the emergency preparation message.
const EMERGENCY_PREPARATION_PROMPT: &str = "\
The passenger has reported an emergency. Acknowledge it in two or three \
short sentences, restate the issue and any location or train details they \
gave, and reassure them that help is being prepared. Do not list phone \
numbers and do not ask unrelated questions.";

/// One inbound chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The user's message text.
    pub message: String,
    /// Prior conversation turns (user and assistant entries only).
    pub history: Vec<ConversationMessage>,
    /// Replaces the default system prompt when set.
    pub system_prompt_override: Option<String>,
    /// Attachments accompanying the message.
    pub attachments: Vec<Attachment>,
}

impl ChatRequest {
    /// Creates a request for a single message with no prior history.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            system_prompt_override: None,
            attachments: Vec::new(),
        }
    }

    /// Seeds the request with prior conversation turns.
    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// Replaces the default system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt_override = Some(prompt.into());
        self
    }

    /// Attaches files to the message.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Terminal errors surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Every provider tier failed; the portal should degrade gracefully.
    #[error(transparent)]
    Exhausted(FallbackError),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl From<FallbackError> for EngineError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::Cancelled => EngineError::Cancelled,
            other => EngineError::Exhausted(other),
        }
    }
}

/// Orchestrates one chat turn end to end.
pub struct CompletionEngine {
    resolver: Arc<dyn ModelResolver>,
    fallback: TieredFallback,
    tools: ToolRouter,
    screen: EmergencyScreen,
    temperature: Option<f32>,
}

impl CompletionEngine {
    /// Creates an engine over a resolver, an ordered tier table, and the
    /// portal's tool router.
    pub fn new(resolver: Arc<dyn ModelResolver>, tiers: Vec<TierConfig>, tools: ToolRouter) -> Self {
        Self {
            resolver,
            fallback: TieredFallback::new(tiers),
            tools,
            screen: EmergencyScreen::new(),
            temperature: None,
        }
    }

    /// Replaces the default fallback controller (policy included).
    pub fn with_fallback(mut self, fallback: TieredFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replaces the default emergency screen.
    pub fn with_screen(mut self, screen: EmergencyScreen) -> Self {
        self.screen = screen;
        self
    }

    /// Sets the sampling temperature passed to every session.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Handles one chat turn and returns the assistant's reply text.
    ///
    /// Emergency turns short-circuit: a confirmed emergency is answered from
    /// fixed templates without any provider call, and a newly detected one
    /// always produces a preparation message ending in the confirmation
    /// instruction, even if every provider is down.
    pub async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        match self.screen.assess(&request.message, &request.history) {
            EmergencyAssessment::Confirmed => {
                tracing::warn!("emergency confirmed; disclosing emergency contacts");
                return Ok(self.screen.confirmed_response());
            }
            EmergencyAssessment::Preparing => {
                tracing::warn!("emergency detected; preparing confirmation");
                return self.prepare_emergency(&request, cancel).await;
            }
            EmergencyAssessment::Normal => {}
        }

        let text = self
            .fallback
            .run(cancel, |tier| self.run_turn(tier, &request, cancel).boxed())
            .await?;
        Ok(text)
    }

    /// One attempt at one tier: open a session, send the turn, drive the
    /// tool loop, and post-process the narration.
    async fn run_turn(
        &self,
        tier: &TierConfig,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        let model = self
            .resolver
            .resolve(tier)
            .map_err(|e| ModelError::session_state(e.to_string()))?;

        let mut params = SessionParams::new(self.system_instruction(request))
            .with_history(request.history.clone())
            .with_tools(self.tools.declarations())
            .with_max_output_tokens(tier.max_output_tokens);
        if let Some(temperature) = self.temperature {
            params = params.with_temperature(temperature);
        }
        let mut session = model.open_session(params);

        tracing::info!(
            tier = tier.tier,
            provider = tier.provider.as_str(),
            model = %tier.model,
            "dispatching chat turn"
        );

        let turn = UserTurn::with_attachments(request.message.clone(), request.attachments.clone());
        let mut outcome = session.send(turn, cancel).await?;

        let mut rounds = 0;
        while outcome.has_tool_calls() && rounds < MAX_TOOL_ROUNDS {
            let mut results = Vec::with_capacity(outcome.tool_calls.len());
            for call in &outcome.tool_calls {
                results.push(self.tools.execute(call).await);
            }
            outcome = session.send_tool_results(results, cancel).await?;
            rounds += 1;
        }
        if outcome.has_tool_calls() {
            tracing::warn!(rounds, "tool round budget spent; returning last narration");
        }

        Ok(self.finish_text(outcome.text).await)
    }

    /// Handles the textual function-call protocol on the final narration:
    /// execute the embedded call, then strip its syntax from the reply.
    async fn finish_text(&self, text: String) -> String {
        let Some(parsed) = extract_function_call(&text) else {
            return text;
        };

        tracing::debug!(name = %parsed.name, "handling textual function call");
        let call = ToolCallRequest::new(parsed.name.clone(), Value::Object(parsed.arguments));
        let result = self.tools.execute(&call).await;

        let narration = strip_function_call(&text, &parsed.span);
        if narration.trim().is_empty() {
            fallback_narration(&result)
        } else {
            narration
        }
    }

    /// Produces the preparation message for a newly detected emergency.
    ///
    /// A provider may personalize the acknowledgment; any failure falls back
    /// to the fixed template. Either way the reply carries a preparation
    /// marker and ends with the confirmation instruction.
    async fn prepare_emergency(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let attempt = self
            .fallback
            .run(cancel, |tier| {
                self.run_preparation(tier, request, cancel).boxed()
            })
            .await;

        let body = match attempt {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => self.screen.preparation_template(&request.message),
            Err(FallbackError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "emergency preparation fell back to template");
                self.screen.preparation_template(&request.message)
            }
        };

        // The appended instruction carries a preparation marker, so the
        // confirmation scan recognizes this reply regardless of the body.
        Ok(format!(
            "{}\n\n{}",
            body.trim_end(),
            self.screen.confirm_instruction()
        ))
    }

    /// One provider attempt at the emergency acknowledgment. No tools are
    /// advertised on this path.
    async fn run_preparation(
        &self,
        tier: &TierConfig,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        let model = self
            .resolver
            .resolve(tier)
            .map_err(|e| ModelError::session_state(e.to_string()))?;

        let mut params = SessionParams::new(EMERGENCY_PREPARATION_PROMPT)
            .with_history(request.history.clone())
            .with_max_output_tokens(tier.max_output_tokens);
        if let Some(temperature) = self.temperature {
            params = params.with_temperature(temperature);
        }
        let mut session = model.open_session(params);

        let outcome = session
            .send(UserTurn::text(request.message.clone()), cancel)
            .await?;
        Ok(outcome.text)
    }

    fn system_instruction(&self, request: &ChatRequest) -> String {
        request
            .system_prompt_override
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

/// Stand-in reply when a textual function call was the entire message.
fn fallback_narration(result: &ToolResult) -> String {
    if let Some(reference) = result.payload.get("reference").and_then(Value::as_str) {
        return format!("Your complaint has been registered. Reference: {reference}.");
    }
    if let Some(error) = result.payload.get("error").and_then(Value::as_str) {
        return format!("I could not complete that action: {error}");
    }
    "Your request has been processed.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_builder_composes() {
        let request = ChatRequest::new("hello")
            .with_history(vec![ConversationMessage::user("earlier")])
            .with_system_prompt("custom prompt")
            .with_attachments(vec![Attachment::new("image/png", "QUJD")]);

        assert_eq!(request.message, "hello");
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.system_prompt_override.as_deref(), Some("custom prompt"));
        assert_eq!(request.attachments.len(), 1);
    }

    #[test]
    fn fallback_narration_quotes_references() {
        let result = ToolResult {
            name: "register_complaint".to_string(),
            correlation_id: String::new(),
            payload: json!({"reference": "CMP-2024-000042"}),
        };
        assert_eq!(
            fallback_narration(&result),
            "Your complaint has been registered. Reference: CMP-2024-000042."
        );

        let failed = ToolResult {
            name: "register_complaint".to_string(),
            correlation_id: String::new(),
            payload: json!({"error": "store unavailable"}),
        };
        assert!(fallback_narration(&failed).contains("store unavailable"));
    }

    #[test]
    fn engine_error_distinguishes_cancellation() {
        let cancelled: EngineError = FallbackError::Cancelled.into();
        assert!(matches!(cancelled, EngineError::Cancelled));

        let exhausted: EngineError = FallbackError::Exhausted {
            tier: 2,
            attempts: 3,
            kind: crate::orchestrator::FailureKind::RateLimited,
            source: ModelError::upstream(429, "quota exceeded"),
        }
        .into();
        assert!(matches!(exhausted, EngineError::Exhausted(_)));
    }
}
