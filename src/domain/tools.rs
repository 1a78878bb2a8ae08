//! Provider-agnostic tool structures.
//!
//! A [`ToolDeclaration`] advertises a callable function to the model; the
//! model answers with [`ToolCallRequest`]s, and the engine feeds back
//! [`ToolResult`]s. Adapters translate declarations into their provider's
//! schema dialect once per session, dropping fields the dialect cannot
//! express.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function signature advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Function name, `[A-Za-z_][A-Za-z0-9_]*`.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-Schema-shaped parameter object.
    pub parameters: Value,
}

impl ToolDeclaration {
    /// Creates a new declaration.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A structured tool-call request emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Name of the declared function being invoked.
    pub name: String,
    /// Structured arguments as a JSON object.
    pub arguments: Value,
    /// Provider-assigned id used to match a later [`ToolResult`] to this
    /// request. Adapters that do not need correlation leave it empty.
    #[serde(default)]
    pub correlation_id: String,
}

impl ToolCallRequest {
    /// Creates a request without a correlation id.
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            correlation_id: String::new(),
        }
    }

    /// Creates a request carrying a provider correlation id.
    pub fn with_correlation_id(
        name: impl Into<String>,
        arguments: Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            correlation_id: correlation_id.into(),
        }
    }
}

/// The result of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the function that was executed.
    pub name: String,
    /// Correlation id copied from the originating request (may be empty).
    #[serde(default)]
    pub correlation_id: String,
    /// Result payload handed back to the model.
    pub payload: Value,
}

impl ToolResult {
    /// Creates a result answering the given request.
    pub fn for_call(call: &ToolCallRequest, payload: Value) -> Self {
        Self {
            name: call.name.clone(),
            correlation_id: call.correlation_id.clone(),
            payload,
        }
    }
}
