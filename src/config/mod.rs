//! Engine configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the `RAIL_SAHAYAK`
//! prefix and `__` (double underscore) as the nesting separator.
//!
//! # Example
//!
//! ```no_run
//! use rail_sahayak::config::EngineConfig;
//!
//! let config = EngineConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod tiers;

pub use error::{ConfigError, ValidationError};
pub use tiers::{default_tier_table, ProviderId, TierConfig};

use serde::Deserialize;
use std::time::Duration;

/// Engine configuration
///
/// Load using [`EngineConfig::load()`] which reads from environment
/// variables, e.g. `RAIL_SAHAYAK__GEMINI_API_KEY=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Gemini API key (tier 0)
    pub gemini_api_key: Option<String>,

    /// OpenAI-compatible gateway API key (fallback tiers)
    pub gateway_api_key: Option<String>,

    /// Gemini API base URL
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// Gateway base URL (OpenAI-compatible `/chat/completions` root)
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Provider request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature passed to every session
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Ordered provider tier table
    #[serde(default = "default_tier_table")]
    pub tiers: Vec<TierConfig>,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Loads a `.env` file if present (development), then reads environment
    /// variables with the `RAIL_SAHAYAK` prefix and `__` separators.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("RAIL_SAHAYAK")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if Gemini is configured
    pub fn has_gemini(&self) -> bool {
        self.gemini_api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Check if the gateway is configured
    pub fn has_gateway(&self) -> bool {
        self.gateway_api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.has_gemini() && !self.has_gateway() {
            return Err(ValidationError::NoProviderConfigured);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.tiers.is_empty() {
            return Err(ValidationError::EmptyTierTable);
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.tier as usize != i {
                return Err(ValidationError::UnorderedTierTable);
            }
            let has_credential = match tier.provider {
                ProviderId::Gemini => self.has_gemini(),
                ProviderId::Gateway => self.has_gateway(),
            };
            if !has_credential {
                return Err(ValidationError::TierWithoutCredential {
                    tier: tier.tier,
                    provider: tier.provider.as_str(),
                });
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gateway_api_key: None,
            gemini_base_url: default_gemini_base_url(),
            gateway_base_url: default_gateway_base_url(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            tiers: default_tier_table(),
        }
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gateway_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.7
}
