//! Provider tier table.
//!
//! An ordinal tier maps to a (provider, model, token-limit) triple, used
//! purely as data by the fallback controller. Tier 0 is the primary/native
//! provider; higher tiers trade quality for availability.

use serde::Deserialize;

/// Backend selected by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Google Gemini native dialect.
    Gemini,
    /// OpenAI-compatible REST gateway.
    Gateway,
}

impl ProviderId {
    /// Stable lowercase name for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Gateway => "gateway",
        }
    }
}

/// One row of the tier table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TierConfig {
    /// Ordinal position, 0 = primary.
    pub tier: u8,
    /// Backing provider.
    pub provider: ProviderId,
    /// Model identifier at that provider.
    pub model: String,
    /// Output token cap for this tier.
    pub max_output_tokens: u32,
}

impl TierConfig {
    /// Creates a tier row.
    pub fn new(
        tier: u8,
        provider: ProviderId,
        model: impl Into<String>,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            tier,
            provider,
            model: model.into(),
            max_output_tokens,
        }
    }
}

/// The default three-tier table: native Gemini first, then progressively
/// cheaper gateway models.
pub fn default_tier_table() -> Vec<TierConfig> {
    vec![
        TierConfig::new(0, ProviderId::Gemini, "gemini-2.0-flash", 8192),
        TierConfig::new(1, ProviderId::Gateway, "llama-3.3-70b-versatile", 4096),
        TierConfig::new(2, ProviderId::Gateway, "llama-3.1-8b-instant", 2048),
    ]
}
