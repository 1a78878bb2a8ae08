//! Emergency detection and two-stage confirmation.
//!
//! An inbound message is screened before any provider dispatch. Detection and
//! confirmation are both pure functions of (current message, prior turns):
//! no server-side state is kept, which makes the machine trivially
//! restartable. Confirmation deliberately requires the most recent assistant
//! turn to be a recognizable emergency *preparation* message, so confirming a
//! routine complaint can never disclose emergency contact numbers.
//!
//! Detection runs three layers in order, first match short-circuits:
//!
//! 1. Explicit unambiguous phrases (including an informal Hindi register).
//! 2. Standalone high-risk keywords, word-boundary anchored so substrings
//!    inside unrelated words ("campfire") never match.
//! 3. An urgency marker AND a distinct serious-condition word co-occurring;
//!    neither alone is sufficient.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::message::{ConversationMessage, MessageRole};

/// Derived per-call emergency phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyAssessment {
    /// Not an emergency; proceed to normal provider dispatch.
    Normal,
    /// Emergency detected; emit a preparation message and await confirmation.
    Preparing,
    /// The user confirmed a prior preparation message; disclose the full
    /// emergency response.
    Confirmed,
}

/// One emergency contact entry, surfaced only in the confirmed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    /// Service label.
    pub label: &'static str,
    /// Dialable number.
    pub number: &'static str,
}

/// Fixed emergency contact list. Not configurable at this layer.
pub const EMERGENCY_CONTACTS: [EmergencyContact; 5] = [
    EmergencyContact {
        label: "Railway Helpline",
        number: "139",
    },
    EmergencyContact {
        label: "RPF Security Helpline",
        number: "182",
    },
    EmergencyContact {
        label: "Police",
        number: "112",
    },
    EmergencyContact {
        label: "Ambulance",
        number: "108",
    },
    EmergencyContact {
        label: "Fire Brigade",
        number: "101",
    },
];

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(emergency|fire|assault(?:ed)?|molestation|robbery|robbed|kidnap(?:ped|ping)?|stampede|derail(?:ed|ment)?)\b",
    )
    .unwrap()
});

static URGENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(immediately|right now|urgent(?:ly)?|asap|turant|jaldi)\b").unwrap()
});

static CONDITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(bleeding|unconscious|trapped|choking|suffocating|injured|collapsed|behosh)\b",
    )
    .unwrap()
});

static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:coach|platform|station|train)\s+(?:no\.?\s*)?[A-Za-z0-9-]+").unwrap()
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:right now|just now|this morning|tonight|at\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\b",
    )
    .unwrap()
});

// 10-digit PNR, the reference number passengers quote.
static REFERENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{10}\b").unwrap());

const DEFAULT_EXPLICIT_PHRASES: &[&str] = &[
    "medical emergency",
    "being attacked",
    "heart attack",
    "can't breathe",
    "cannot breathe",
    "madad karo",
    "bachao",
    "aag lag gayi",
    "jaan ka khatra",
];

const DEFAULT_CONFIRMATION_TOKENS: &[&str] = &[
    "confirm",
    "confirmed",
    "yes",
    "ok",
    "okay",
    "proceed",
    "submit",
    "haan",
];

// Marker phrases that identify an assistant turn as an emergency preparation
// message, distinct from routine complaint confirmations. The engine appends
// the confirm-instruction line to every preparation reply, so at least one
// marker is always present.
const DEFAULT_PREPARATION_MARKERS: &[&str] = &[
    "emergency details noted",
    "dispatch emergency assistance",
    "emergency assistance request",
];

/// Extracted field summary shown in the preparation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencySummary {
    /// The reported issue, verbatim.
    pub issue: String,
    /// Location fragment (coach/platform/station/train), if mentioned.
    pub location: Option<String>,
    /// Time fragment, if mentioned.
    pub time: Option<String>,
    /// Identifying reference number (PNR), if present.
    pub reference: Option<String>,
}

/// Screens inbound messages for emergencies and drives the two-stage
/// confirmation.
///
/// The phrase sets are configuration, not a load-bearing contract: swap them
/// through the `with_*` builders if the portal's wording changes.
#[derive(Debug, Clone)]
pub struct EmergencyScreen {
    explicit_phrases: Vec<String>,
    confirmation_tokens: Vec<String>,
    preparation_markers: Vec<String>,
}

impl Default for EmergencyScreen {
    fn default() -> Self {
        Self {
            explicit_phrases: DEFAULT_EXPLICIT_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confirmation_tokens: DEFAULT_CONFIRMATION_TOKENS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preparation_markers: DEFAULT_PREPARATION_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl EmergencyScreen {
    /// Creates a screen with the default phrase sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the explicit-phrase set.
    pub fn with_explicit_phrases(mut self, phrases: Vec<String>) -> Self {
        self.explicit_phrases = phrases;
        self
    }

    /// Replaces the confirmation token set.
    pub fn with_confirmation_tokens(mut self, tokens: Vec<String>) -> Self {
        self.confirmation_tokens = tokens;
        self
    }

    /// Replaces the preparation marker set.
    pub fn with_preparation_markers(mut self, markers: Vec<String>) -> Self {
        self.preparation_markers = markers;
        self
    }

    /// Classifies the inbound message against the prior turns.
    pub fn assess(
        &self,
        message: &str,
        history: &[ConversationMessage],
    ) -> EmergencyAssessment {
        if self.is_confirmation_token(message) {
            return if self.last_assistant_was_preparation(history) {
                EmergencyAssessment::Confirmed
            } else {
                EmergencyAssessment::Normal
            };
        }
        if self.is_emergency(message) {
            EmergencyAssessment::Preparing
        } else {
            EmergencyAssessment::Normal
        }
    }

    /// Returns true if the message trips any of the three detection layers.
    pub fn is_emergency(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();

        if self
            .explicit_phrases
            .iter()
            .any(|p| lowered.contains(p.as_str()))
        {
            return true;
        }
        if KEYWORD_RE.is_match(message) {
            return true;
        }
        URGENCY_RE.is_match(message) && CONDITION_RE.is_match(message)
    }

    /// Whole-message confirmation token match, case-insensitive, tolerant of
    /// trailing punctuation.
    pub fn is_confirmation_token(&self, message: &str) -> bool {
        let normalized = message
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_lowercase();
        self.confirmation_tokens.iter().any(|t| *t == normalized)
    }

    /// Returns true if assistant text is a recognizable emergency
    /// preparation message.
    pub fn is_preparation_message(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.preparation_markers
            .iter()
            .any(|m| lowered.contains(m.as_str()))
    }

    fn last_assistant_was_preparation(&self, history: &[ConversationMessage]) -> bool {
        history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| self.is_preparation_message(&m.text()))
            .unwrap_or(false)
    }

    /// Extracts the structured field summary from an emergency message.
    pub fn summarize(&self, message: &str) -> EmergencySummary {
        EmergencySummary {
            issue: message.trim().to_string(),
            location: LOCATION_RE.find(message).map(|m| m.as_str().to_string()),
            time: TIME_RE.find(message).map(|m| m.as_str().to_string()),
            reference: REFERENCE_RE.find(message).map(|m| m.as_str().to_string()),
        }
    }

    /// The instruction line appended to every preparation reply. Contains a
    /// preparation marker so the confirmation scan always recognizes it.
    pub fn confirm_instruction(&self) -> &'static str {
        "Reply CONFIRM to dispatch emergency assistance to your location."
    }

    /// Hardcoded preparation message used when the provider call for a
    /// personalized one fails. Never includes contact numbers.
    pub fn preparation_template(&self, message: &str) -> String {
        let summary = self.summarize(message);
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "not provided".to_string());

        format!(
            "I understand this is an emergency. Please stay calm - help is being arranged.\n\n\
             Emergency details noted:\n\
             - Issue: {}\n\
             - Location: {}\n\
             - Time: {}\n\
             - Reference: {}",
            summary.issue,
            field(&summary.location),
            field(&summary.time),
            field(&summary.reference),
        )
    }

    /// The full emergency response: numbered immediate actions plus the
    /// contact list. This is the only message that discloses contact numbers.
    pub fn confirmed_response(&self) -> String {
        let mut out = String::from(
            "Emergency assistance request confirmed. Responders are being notified.\n\n\
             Immediate actions:\n\
             1. Stay where you are unless you are in direct danger.\n\
             2. Alert the train staff, coach attendant, or station master nearby.\n\
             3. Keep your phone reachable and the line free.\n\
             4. If safe, note the coach number and nearest landmark.\n\n\
             Emergency contacts:\n",
        );
        for contact in EMERGENCY_CONTACTS {
            out.push_str(&format!("- {}: {}\n", contact.label, contact.number));
        }
        out
    }
}
