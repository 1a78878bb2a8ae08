//! OpenAI-compatible gateway adapter (`/chat/completions` dialect).
//!
//! Serves the fallback tiers through a single adapter parameterized by model
//! id, so tier 1 and tier 2 differ only in configuration. Authentication is a
//! `Bearer` header; tool calls arrive with provider-issued ids that are
//! preserved as correlation ids and echoed back via `tool_call_id`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::{ConversationMessage, MessageRole, Part, ToolCallRequest, ToolDeclaration, ToolResult};
use crate::ports::{
    ChatModel, ChatSession, ModelError, ModelInfo, SessionParams, TurnOutcome, UserTurn,
};

use super::{check_status, execute_cancellable};

/// Gateway adapter configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GatewayConfig {
    /// Creates a configuration pointed at the default gateway.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: model.into(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the gateway root URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// OpenAI-compatible [`ChatModel`].
pub struct GatewayModel {
    config: GatewayConfig,
    client: Client,
}

impl GatewayModel {
    /// Creates the adapter, building an HTTP client with the configured
    /// timeout.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

impl ChatModel for GatewayModel {
    fn open_session(&self, params: SessionParams) -> Box<dyn ChatSession> {
        Box::new(GatewaySession {
            client: self.client.clone(),
            config: self.config.clone(),
            system_instruction: params.system_instruction,
            tools: params.tools,
            temperature: params.temperature,
            max_output_tokens: params.max_output_tokens,
            history: params.history,
            pending_calls: Vec::new(),
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("gateway", &self.config.model)
    }
}

struct GatewaySession {
    client: Client,
    config: GatewayConfig,
    system_instruction: String,
    tools: Vec<ToolDeclaration>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    history: Vec<ConversationMessage>,
    pending_calls: Vec<ToolCallRequest>,
}

#[async_trait]
impl ChatSession for GatewaySession {
    async fn send(
        &mut self,
        turn: UserTurn,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        let user_entry = ConversationMessage::user_with_attachments(turn.text, turn.attachments);

        let mut messages = self.wire_history();
        messages.extend(message_to_wire(&user_entry));

        let outcome = self.dispatch(messages, cancel).await?;

        self.history.push(user_entry);
        self.record_assistant(&outcome);
        Ok(outcome)
    }

    async fn send_tool_results(
        &mut self,
        results: Vec<ToolResult>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        if self.pending_calls.is_empty() {
            return Err(ModelError::session_state(
                "send_tool_results called without pending tool calls",
            ));
        }

        let results_entry = ConversationMessage::tool_results(results);

        let mut messages = self.wire_history();
        messages.extend(message_to_wire(&results_entry));

        let outcome = self.dispatch(messages, cancel).await?;

        self.history.push(results_entry);
        self.record_assistant(&outcome);
        Ok(outcome)
    }

    fn history(&self) -> &[ConversationMessage] {
        &self.history
    }
}

impl GatewaySession {
    fn wire_history(&self) -> Vec<WireMessage> {
        let mut messages = vec![WireMessage::system(&self.system_instruction)];
        for entry in &self.history {
            messages.extend(message_to_wire(entry));
        }
        messages
    }

    async fn dispatch(
        &self,
        messages: Vec<WireMessage>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tools: declare_tools(&self.tools),
            tool_choice: if self.tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(model = %self.config.model, "sending gateway request");

        let request = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body);

        let timeout_secs = self.config.timeout.as_secs() as u32;
        let response = execute_cancellable(request, timeout_secs, cancel).await?;
        let response = check_status(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::parse(format!("invalid chat completion response: {e}")))?;

        parse_outcome(parsed)
    }

    fn record_assistant(&mut self, outcome: &TurnOutcome) {
        if outcome.has_tool_calls() {
            self.history.push(ConversationMessage::assistant_tool_calls(
                outcome.text.clone(),
                outcome.tool_calls.clone(),
            ));
        } else {
            self.history
                .push(ConversationMessage::assistant(outcome.text.clone()));
        }
        self.pending_calls = outcome.tool_calls.clone();
    }
}

// --- wire types -------------------------------------------------------------

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn system(text: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(WireContent::Text(text.to_string())),
            ..Default::default()
        }
    }
}

/// Message content: a plain string, or typed parts for multimodal input.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WireContentPart>),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentPart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Serialize, Deserialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments, as a string per the dialect.
    arguments: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireChoice {
    message: WireMessage,
}

// --- pure mapping helpers ---------------------------------------------------

/// One conversation entry can expand to several wire messages: tool-result
/// entries become one `role: "tool"` message per result.
fn message_to_wire(message: &ConversationMessage) -> Vec<WireMessage> {
    match message.role {
        MessageRole::User => vec![WireMessage {
            role: "user".to_string(),
            content: Some(user_content(message)),
            ..Default::default()
        }],
        MessageRole::Assistant => {
            let calls: Vec<WireToolCall> = message
                .tool_calls()
                .into_iter()
                .map(|call| WireToolCall {
                    id: call.correlation_id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect();
            let text = message.text();
            vec![WireMessage {
                role: "assistant".to_string(),
                content: if text.is_empty() {
                    None
                } else {
                    Some(WireContent::Text(text))
                },
                tool_calls: if calls.is_empty() { None } else { Some(calls) },
                ..Default::default()
            }]
        }
        MessageRole::Tool => message
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolResult(result) => Some(WireMessage {
                    role: "tool".to_string(),
                    content: Some(WireContent::Text(result.payload.to_string())),
                    tool_call_id: Some(result.correlation_id.clone()),
                    ..Default::default()
                }),
                _ => None,
            })
            .collect(),
    }
}

fn user_content(message: &ConversationMessage) -> WireContent {
    let has_attachments = message
        .parts
        .iter()
        .any(|p| matches!(p, Part::Attachment(_)));
    if !has_attachments {
        return WireContent::Text(message.text());
    }

    let parts = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) => Some(WireContentPart::Text { text: text.clone() }),
            Part::Attachment(att) if att.is_image() => Some(WireContentPart::ImageUrl {
                image_url: WireImageUrl {
                    url: att.to_data_uri(),
                },
            }),
            // Non-image attachments degrade to a textual placeholder.
            Part::Attachment(att) => Some(WireContentPart::Text {
                text: format!("[attachment: {}]", att.mime_type),
            }),
            _ => None,
        })
        .collect();
    WireContent::Parts(parts)
}

fn declare_tools(tools: &[ToolDeclaration]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            kind: "function".to_string(),
            function: WireFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                // This dialect accepts JSON schema as-is.
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn parse_outcome(response: ChatCompletionResponse) -> Result<TurnOutcome, ModelError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::parse("completion response contained no choices"))?;

    let text = match choice.message.content {
        Some(WireContent::Text(text)) => text,
        Some(WireContent::Parts(parts)) => parts
            .into_iter()
            .filter_map(|p| match p {
                WireContentPart::Text { text } => Some(text),
                WireContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::debug!(
                    name = %call.function.name,
                    error = %e,
                    "tool call arguments were not valid JSON"
                );
                json!({})
            });
            ToolCallRequest::with_correlation_id(call.function.name, arguments, call.id)
        })
        .collect();

    Ok(TurnOutcome { text, tool_calls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attachment;
    use serde_json::json;

    #[test]
    fn plain_user_message_serializes_as_string_content() {
        let wire = message_to_wire(&ConversationMessage::user("train is late"));
        assert_eq!(wire.len(), 1);
        let rendered = serde_json::to_value(&wire[0]).unwrap();
        assert_eq!(rendered["role"], "user");
        assert_eq!(rendered["content"], "train is late");
    }

    #[test]
    fn image_attachments_become_image_url_parts() {
        let msg = ConversationMessage::user_with_attachments(
            "see photo",
            vec![Attachment::new("image/png", "QUJD")],
        );
        let rendered = serde_json::to_value(&message_to_wire(&msg)[0]).unwrap();
        assert_eq!(rendered["content"][0]["type"], "text");
        assert_eq!(rendered["content"][1]["type"], "image_url");
        assert_eq!(
            rendered["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn non_image_attachments_degrade_to_placeholders() {
        let msg = ConversationMessage::user_with_attachments(
            "see doc",
            vec![Attachment::new("application/pdf", "JVBER")],
        );
        let rendered = serde_json::to_value(&message_to_wire(&msg)[0]).unwrap();
        assert_eq!(rendered["content"][1]["type"], "text");
        assert_eq!(rendered["content"][1]["text"], "[attachment: application/pdf]");
    }

    #[test]
    fn tool_results_expand_to_one_message_each() {
        let results = vec![
            ToolResult {
                name: "register_complaint".to_string(),
                correlation_id: "call_1".to_string(),
                payload: json!({"reference": "CMP-2024-000001"}),
            },
            ToolResult {
                name: "get_complaints".to_string(),
                correlation_id: "call_2".to_string(),
                payload: json!({"complaints": []}),
            },
        ];
        let wire = message_to_wire(&ConversationMessage::tool_results(results));
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "tool");
        assert_eq!(wire[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(wire[1].tool_call_id.as_deref(), Some("call_2"));
    }

    #[test]
    fn assistant_tool_call_entry_round_trips_arguments_as_string() {
        let call = ToolCallRequest::with_correlation_id(
            "validate_reference",
            json!({"kind": "train"}),
            "call_9",
        );
        let msg = ConversationMessage::assistant_tool_calls("", vec![call]);
        let rendered = serde_json::to_value(&message_to_wire(&msg)[0]).unwrap();
        assert_eq!(rendered["role"], "assistant");
        assert!(rendered.get("content").is_none());
        assert_eq!(rendered["tool_calls"][0]["id"], "call_9");
        assert_eq!(
            rendered["tool_calls"][0]["function"]["arguments"],
            "{\"kind\":\"train\"}"
        );
    }

    #[test]
    fn parse_outcome_preserves_correlation_ids() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "register_complaint",
                            "arguments": "{\"category\":\"security\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let outcome = parse_outcome(response).unwrap();
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.tool_calls[0].correlation_id, "call_abc");
        assert_eq!(outcome.tool_calls[0].arguments["category"], "security");
    }

    #[test]
    fn malformed_arguments_degrade_to_empty_object() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_x",
                        "type": "function",
                        "function": {"name": "ping", "arguments": "not json"}
                    }]
                }
            }]
        }))
        .unwrap();

        let outcome = parse_outcome(response).unwrap();
        assert_eq!(outcome.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let response = ChatCompletionResponse::default();
        assert!(matches!(
            parse_outcome(response),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn config_debug_redacts_the_key() {
        let config = GatewayConfig::new("gsk-secret", "llama-3.3-70b-versatile");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("gsk-secret"));
    }
}
