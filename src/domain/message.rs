//! Conversation messages exchanged between the caller and the engine.
//!
//! The caller only ever supplies and receives `User` and `Assistant` turns.
//! During a single exchange the engine may append transient `Tool` entries
//! (tool-call requests and their results) to a session's internal history;
//! those never leave the engine.

use serde::{Deserialize, Serialize};

use super::tools::{ToolCallRequest, ToolResult};

/// A single message in a conversation, ordered and append-only from the
/// caller's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who produced this message.
    pub role: MessageRole,
    /// Content parts: text, attachments, or transient tool entries.
    pub parts: Vec<Part>,
}

impl ConversationMessage {
    /// Creates a plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Creates a user turn carrying zero or more attachments.
    pub fn user_with_attachments(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut parts = vec![Part::Text(text.into())];
        parts.extend(attachments.into_iter().map(Part::Attachment));
        Self {
            role: MessageRole::User,
            parts,
        }
    }

    /// Creates a plain-text assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Creates an assistant turn that requested tool calls, optionally with
    /// accompanying narration text.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let text = text.into();
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        parts.extend(calls.into_iter().map(Part::ToolCall));
        Self {
            role: MessageRole::Assistant,
            parts,
        }
    }

    /// Creates a transient tool-result entry.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: MessageRole::Tool,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Concatenated text content of this message (tool and attachment parts
    /// contribute nothing).
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Text(t) = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(t);
            }
        }
        out
    }

    /// Tool calls requested by this message, if any.
    pub fn tool_calls(&self) -> Vec<&ToolCallRequest> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Returns true if any part is a tool-call request.
    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall(_)))
    }
}

/// Role of the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Transient tool-result entry, internal to one exchange.
    Tool,
}

/// One content part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text(String),
    /// Binary attachment reference.
    Attachment(Attachment),
    /// A structured tool-call request emitted by the model.
    ToolCall(ToolCallRequest),
    /// The result of executing a tool call.
    ToolResult(ToolResult),
}

/// A binary attachment, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Payload encoded as base64 text.
    pub data: String,
}

impl Attachment {
    /// Creates a new attachment from a MIME type and base64-encoded payload.
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Returns true if the attachment is an image.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Renders the attachment as an RFC 2397 data URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}
