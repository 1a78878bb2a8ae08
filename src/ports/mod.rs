//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! engine and the outside world. Adapters implement these ports.
//!
//! - `ChatModel` / `ChatSession` - LLM provider capability contract
//! - `ModelResolver` - adapter lookup for a configured tier
//! - `ComplaintStore` - complaint persistence owned by the host portal
//! - `ReferenceValidator` - station/train reference data validation

mod chat_model;
mod complaint_store;
mod reference_data;

pub use chat_model::{
    ChatModel, ChatSession, ModelError, ModelInfo, ModelResolver, ResolveError, SessionParams,
    TurnOutcome, UserTurn,
};
pub use complaint_store::{Complaint, ComplaintDraft, ComplaintStatus, ComplaintStore, StoreError};
pub use reference_data::{ReferenceError, ReferenceKind, ReferenceValidator, ValidationOutcome};
