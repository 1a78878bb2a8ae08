//! Domain types for the completion orchestration engine.
//!
//! Everything here is pure: conversation messages, tool-call structures, the
//! text-embedded function-call protocol, and the emergency detection state
//! machine. No I/O, no provider coupling.

pub mod emergency;
pub mod function_call;
pub mod message;
pub mod tools;

pub use emergency::{EmergencyAssessment, EmergencyContact, EmergencyScreen, EMERGENCY_CONTACTS};
pub use function_call::{extract_function_call, strip_function_call, ParsedFunctionCall};
pub use message::{Attachment, ConversationMessage, MessageRole, Part};
pub use tools::{ToolCallRequest, ToolDeclaration, ToolResult};
