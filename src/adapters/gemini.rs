//! Google Gemini adapter (native `generateContent` dialect).
//!
//! Serves tier 0. The wire format is camelCase throughout: `contents` with
//! `parts` carrying `text`, `inlineData`, `functionCall`, or
//! `functionResponse`; tool declarations under `tools[].functionDeclarations`;
//! sampling knobs in `generationConfig`. The API key travels as a query
//! parameter, not a header.
//!
//! Gemini returns structured tool calls without correlation ids, so requests
//! carry an empty `correlation_id` and results are matched back by name.

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

/// Gemini adapter configuration.
#[derive(Clone)]
pub struct GeminiConfig {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiConfig {
    /// Creates a configuration with default base URL and timeout.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the API base URL (useful for proxies and tests).
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

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Gemini-backed [`ChatModel`].
pub struct GeminiModel {
    config: GeminiConfig,
    client: Client,
}

impl GeminiModel {
    /// Creates the adapter, building an HTTP client with the configured
    /// timeout.
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }
}

impl ChatModel for GeminiModel {
    fn open_session(&self, params: SessionParams) -> Box<dyn ChatSession> {
        Box::new(GeminiSession {
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
        ModelInfo::new("gemini", &self.config.model)
    }
}

struct GeminiSession {
    client: Client,
    config: GeminiConfig,
    system_instruction: String,
    tools: Vec<ToolDeclaration>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    history: Vec<ConversationMessage>,
    pending_calls: Vec<ToolCallRequest>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(
        &mut self,
        turn: UserTurn,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        let user_entry = ConversationMessage::user_with_attachments(turn.text, turn.attachments);

        let mut contents: Vec<WireContent> = self.history.iter().map(message_to_wire).collect();
        contents.push(message_to_wire(&user_entry));

        let outcome = self.dispatch(contents, cancel).await?;

        // History is only extended once the exchange succeeded.
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

        let mut contents: Vec<WireContent> = self.history.iter().map(message_to_wire).collect();
        contents.push(message_to_wire(&results_entry));

        let outcome = self.dispatch(contents, cancel).await?;

        self.history.push(results_entry);
        self.record_assistant(&outcome);
        Ok(outcome)
    }

    fn history(&self) -> &[ConversationMessage] {
        &self.history
    }
}

impl GeminiSession {
    async fn dispatch(
        &self,
        contents: Vec<WireContent>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ModelError> {
        let body = GenerateContentRequest {
            system_instruction: Some(WireContent {
                role: None,
                parts: vec![WirePart::text(&self.system_instruction)],
            }),
            contents,
            tools: declare_tools(&self.tools),
            generation_config: WireGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        tracing::debug!(model = %self.config.model, "sending gemini request");

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.expose_secret().as_str())])
            .json(&body);

        let timeout_secs = self.config.timeout.as_secs() as u32;
        let response = execute_cancellable(request, timeout_secs, cancel).await?;
        let response = check_status(response).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::parse(format!("invalid generateContent response: {e}")))?;

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
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireToolGroup>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

/// A single part, modeled as a bag of optional fields so unknown part shapes
/// deserialize to an empty part instead of failing the whole response.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireInlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireFunctionCall {
    name: String,
    args: Value,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateContentResponse {
    candidates: Vec<WireCandidate>,
    prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireCandidate {
    content: Option<WireContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WirePromptFeedback {
    block_reason: Option<String>,
}

// --- pure mapping helpers ---------------------------------------------------

fn message_to_wire(message: &ConversationMessage) -> WireContent {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
        // Function responses travel back under the user role.
        MessageRole::Tool => "user",
    };

    let parts = message
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::text(text),
            Part::Attachment(att) => WirePart {
                inline_data: Some(WireInlineData {
                    mime_type: att.mime_type.clone(),
                    data: att.data.clone(),
                }),
                ..Default::default()
            },
            Part::ToolCall(call) => WirePart {
                function_call: Some(WireFunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                ..Default::default()
            },
            Part::ToolResult(result) => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: result.name.clone(),
                    response: wrap_response(&result.payload),
                }),
                ..Default::default()
            },
        })
        .collect();

    WireContent {
        role: Some(role.to_string()),
        parts,
    }
}

/// `functionResponse.response` must be a JSON object; scalar payloads are
/// wrapped.
fn wrap_response(payload: &Value) -> Value {
    if payload.is_object() {
        payload.clone()
    } else {
        json!({ "result": payload })
    }
}

fn declare_tools(tools: &[ToolDeclaration]) -> Vec<WireToolGroup> {
    if tools.is_empty() {
        return Vec::new();
    }
    vec![WireToolGroup {
        function_declarations: tools
            .iter()
            .map(|t| WireFunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: translate_schema(&t.parameters),
            })
            .collect(),
    }]
}

/// Reduces a JSON-schema fragment to the subset Gemini's function-declaration
/// dialect accepts: `type`, `description`, `enum`, `properties`, `required`,
/// and `items`. Everything else is dropped silently.
fn translate_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut out = serde_json::Map::new();
    for key in ["type", "description", "enum", "required"] {
        if let Some(v) = obj.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        let translated: serde_json::Map<String, Value> = props
            .iter()
            .map(|(name, sub)| (name.clone(), translate_schema(sub)))
            .collect();
        out.insert("properties".to_string(), Value::Object(translated));
    }
    if let Some(items) = obj.get("items") {
        out.insert("items".to_string(), translate_schema(items));
    }
    Value::Object(out)
}

fn parse_outcome(response: GenerateContentResponse) -> Result<TurnOutcome, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        // Surfaced as an upstream error so the classifier can read the
        // safety wording.
        return Err(ModelError::upstream(
            200,
            format!("response blocked: {reason}"),
        ));
    };

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ModelError::upstream(
            200,
            "response blocked by safety settings",
        ));
    }

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(content) = candidate.content {
        for part in content.parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                // Gemini carries no call ids; correlation stays empty.
                tool_calls.push(ToolCallRequest::new(call.name, call.args));
            }
        }
    }

    Ok(TurnOutcome { text, tool_calls })
}
