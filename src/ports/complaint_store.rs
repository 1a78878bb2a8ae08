//! Complaint Store Port - complaint persistence owned by the host portal.
//!
//! The engine only consumes this as a capability: register a complaint
//! drafted by the model, list previously registered complaints. Storage
//! details (the portal keeps them in a local mock database) are invisible
//! here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields the model supplies when registering a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintDraft {
    /// Complaint category, e.g. "cleanliness", "food", "security".
    pub category: String,
    /// Free-form description of the issue.
    pub description: String,
    /// Coach/platform/station fragment, if known.
    #[serde(default)]
    pub location: Option<String>,
    /// Train number, if known.
    #[serde(default)]
    pub train_number: Option<String>,
    /// Passenger PNR, if provided.
    #[serde(default)]
    pub pnr: Option<String>,
}

/// A registered complaint as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    /// Store-assigned id.
    pub id: Uuid,
    /// Human-quotable reference, e.g. "CMP-2024-000137".
    pub reference: String,
    /// Complaint category.
    pub category: String,
    /// Description of the issue.
    pub description: String,
    /// Location fragment, if known.
    pub location: Option<String>,
    /// Train number, if known.
    pub train_number: Option<String>,
    /// Passenger PNR, if provided.
    pub pnr: Option<String>,
    /// Processing status.
    pub status: ComplaintStatus,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Complaint processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    /// Newly registered.
    Registered,
    /// Assigned and being worked.
    InProgress,
    /// Closed.
    Resolved,
}

/// Port for the portal's complaint storage.
#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Registers a new complaint and returns the stored record.
    async fn add_complaint(&self, draft: ComplaintDraft) -> Result<Complaint, StoreError>;

    /// Lists registered complaints.
    async fn complaints(&self) -> Result<Vec<Complaint>, StoreError>;
}

/// Errors from the complaint store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage could not be reached.
    #[error("complaint store unavailable: {0}")]
    Unavailable(String),

    /// The draft was rejected by the store.
    #[error("invalid complaint draft: {0}")]
    InvalidDraft(String),
}
