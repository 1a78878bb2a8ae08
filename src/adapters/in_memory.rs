//! In-memory collaborator adapters.
//!
//! The portal owns real complaint storage and reference data; these adapters
//! stand in for them during tests and local development.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use uuid::Uuid;

use crate::ports::{
    Complaint, ComplaintDraft, ComplaintStatus, ComplaintStore, ReferenceError, ReferenceKind,
    ReferenceValidator, StoreError, ValidationOutcome,
};

/// Complaint store backed by a mutex-guarded vector.
#[derive(Default)]
pub struct InMemoryComplaintStore {
    complaints: Mutex<Vec<Complaint>>,
}

impl InMemoryComplaintStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComplaintStore for InMemoryComplaintStore {
    async fn add_complaint(&self, draft: ComplaintDraft) -> Result<Complaint, StoreError> {
        if draft.category.trim().is_empty() {
            return Err(StoreError::InvalidDraft("category is required".to_string()));
        }
        if draft.description.trim().is_empty() {
            return Err(StoreError::InvalidDraft(
                "description is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut complaints = self
            .complaints
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;

        let complaint = Complaint {
            id: Uuid::new_v4(),
            reference: format!("CMP-{}-{:06}", now.year(), complaints.len() + 1),
            category: draft.category,
            description: draft.description,
            location: draft.location,
            train_number: draft.train_number,
            pnr: draft.pnr,
            status: ComplaintStatus::Registered,
            created_at: now,
        };
        complaints.push(complaint.clone());

        tracing::info!(reference = %complaint.reference, category = %complaint.category, "complaint registered");
        Ok(complaint)
    }

    async fn complaints(&self) -> Result<Vec<Complaint>, StoreError> {
        self.complaints
            .lock()
            .map(|c| c.clone())
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

/// Station and train lookups over small built-in tables.
///
/// Station values match by code or by case-insensitive name; train values by
/// number. Misses return up to three prefix-based suggestions.
#[derive(Default)]
pub struct StaticReferenceValidator;

const STATIONS: &[(&str, &str)] = &[
    ("NDLS", "New Delhi"),
    ("BCT", "Mumbai Central"),
    ("HWH", "Howrah Junction"),
    ("MAS", "Chennai Central"),
    ("SBC", "Bengaluru City Junction"),
    ("CNB", "Kanpur Central"),
    ("PNBE", "Patna Junction"),
    ("ADI", "Ahmedabad Junction"),
];

const TRAINS: &[(&str, &str)] = &[
    ("12951", "Mumbai Rajdhani Express"),
    ("12301", "Howrah Rajdhani Express"),
    ("12621", "Tamil Nadu Express"),
    ("12002", "Bhopal Shatabdi Express"),
    ("12839", "Howrah Mail"),
];

impl StaticReferenceValidator {
    /// Creates the validator.
    pub fn new() -> Self {
        Self
    }

    fn validate_station(value: &str) -> ValidationOutcome {
        let upper = value.to_uppercase();
        for (code, name) in STATIONS {
            if *code == upper || name.eq_ignore_ascii_case(value) {
                return ValidationOutcome::valid(format!("{name} ({code})"));
            }
        }
        let suggestions = STATIONS
            .iter()
            .filter(|(code, name)| {
                code.starts_with(&upper) || name.to_lowercase().contains(&value.to_lowercase())
            })
            .take(3)
            .map(|(code, name)| format!("{name} ({code})"))
            .collect();
        ValidationOutcome::invalid(suggestions)
    }

    fn validate_train(value: &str) -> ValidationOutcome {
        let trimmed = value.trim();
        for (number, name) in TRAINS {
            if *number == trimmed || name.eq_ignore_ascii_case(trimmed) {
                return ValidationOutcome::valid(format!("{name} ({number})"));
            }
        }
        let suggestions = TRAINS
            .iter()
            .filter(|(number, name)| {
                number.starts_with(trimmed) || name.to_lowercase().contains(&trimmed.to_lowercase())
            })
            .take(3)
            .map(|(number, name)| format!("{name} ({number})"))
            .collect();
        ValidationOutcome::invalid(suggestions)
    }
}

#[async_trait]
impl ReferenceValidator for StaticReferenceValidator {
    async fn validate(
        &self,
        kind: ReferenceKind,
        value: &str,
    ) -> Result<ValidationOutcome, ReferenceError> {
        let outcome = match kind {
            ReferenceKind::Station => Self::validate_station(value),
            ReferenceKind::Train => Self::validate_train(value),
        };
        Ok(outcome)
    }
}
