//! Reference Data Port - station/train validation owned by the host portal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of reference value being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// Station name or code.
    Station,
    /// Train number or name.
    Train,
}

/// Outcome of validating a reference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the value resolved to a known entry.
    pub valid: bool,
    /// Canonical form when valid, e.g. "NDLS" -> "New Delhi (NDLS)".
    pub canonical: Option<String>,
    /// Close matches offered when invalid.
    pub suggestions: Vec<String>,
}

impl ValidationOutcome {
    /// Creates a valid outcome with a canonical form.
    pub fn valid(canonical: impl Into<String>) -> Self {
        Self {
            valid: true,
            canonical: Some(canonical.into()),
            suggestions: Vec::new(),
        }
    }

    /// Creates an invalid outcome with suggestions.
    pub fn invalid(suggestions: Vec<String>) -> Self {
        Self {
            valid: false,
            canonical: None,
            suggestions,
        }
    }
}

/// Port for the portal's station/train reference data.
#[async_trait]
pub trait ReferenceValidator: Send + Sync {
    /// Validates a value against the reference data set.
    async fn validate(
        &self,
        kind: ReferenceKind,
        value: &str,
    ) -> Result<ValidationOutcome, ReferenceError>;
}

/// Errors from the reference data source.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// The reference data set could not be reached.
    #[error("reference data unavailable: {0}")]
    Unavailable(String),
}
