//! Failure classification.
//!
//! Maps a raised provider error to a taxonomy plus an escalation decision.
//! Classification is a pure, deterministic function of the HTTP status code
//! and case-insensitive message substrings; rules are ordered and the first
//! match wins.

use crate::ports::ModelError;

/// Taxonomy of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 429 / quota exhausted.
    RateLimited,
    /// 5xx from the provider.
    ServerError,
    /// The requested model is unknown, invalid, or unsupported.
    BadModel,
    /// Transport-level failure (connection, DNS, timeout).
    NetworkError,
    /// Credential rejected.
    AuthError,
    /// Output blocked by the provider's safety layer.
    ContentFiltered,
    /// Provider reports itself overloaded.
    Overloaded,
    /// Anything else.
    Unknown,
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "quota exceeded",
    "resource exhausted",
];

const BAD_MODEL_MARKERS: &[&str] = &["unknown", "invalid", "unsupported", "not found", "decommissioned"];

const NETWORK_MARKERS: &[&str] = &["network", "timeout", "timed out", "connection", "dns"];

const AUTH_MARKERS: &[&str] = &["api key", "authentication", "unauthorized", "forbidden"];

const CONTENT_MARKERS: &[&str] = &["safety", "blocked", "content filter", "harm"];

const OVERLOAD_MARKERS: &[&str] = &["overloaded", "capacity", "busy"];

impl FailureKind {
    /// Classifies a status code plus error message.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let msg = message.to_lowercase();
        let contains_any = |markers: &[&str]| markers.iter().any(|m| msg.contains(m));

        if status == Some(429) || contains_any(RATE_LIMIT_MARKERS) {
            return FailureKind::RateLimited;
        }
        if matches!(status, Some(s) if (500..600).contains(&s)) {
            return FailureKind::ServerError;
        }
        if status == Some(400) && msg.contains("model") && contains_any(BAD_MODEL_MARKERS) {
            return FailureKind::BadModel;
        }
        if contains_any(NETWORK_MARKERS) {
            return FailureKind::NetworkError;
        }
        if matches!(status, Some(401 | 403)) || contains_any(AUTH_MARKERS) {
            return FailureKind::AuthError;
        }
        if contains_any(CONTENT_MARKERS) {
            return FailureKind::ContentFiltered;
        }
        if contains_any(OVERLOAD_MARKERS) {
            return FailureKind::Overloaded;
        }
        FailureKind::Unknown
    }

    /// Classifies an adapter-boundary error.
    pub fn of(error: &ModelError) -> Self {
        match error {
            ModelError::Upstream { status, message } => Self::classify(Some(*status), message),
            ModelError::Network(_) | ModelError::Timeout { .. } => FailureKind::NetworkError,
            ModelError::Parse(_) | ModelError::SessionState(_) | ModelError::Cancelled => {
                FailureKind::Unknown
            }
        }
    }

    /// Whether the fallback controller should escalate to the next tier.
    ///
    /// Every classified kind escalates; only `Unknown` retries in place.
    pub fn should_escalate(&self) -> bool {
        !matches!(self, FailureKind::Unknown)
    }
}
