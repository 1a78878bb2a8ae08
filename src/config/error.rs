//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("No provider credential configured")]
    NoProviderConfigured,

    #[error("Tier table is empty")]
    EmptyTierTable,

    #[error("Tier table ordinals must be strictly ascending from 0")]
    UnorderedTierTable,

    #[error("Tier {tier} uses provider {provider} which has no credential")]
    TierWithoutCredential { tier: u8, provider: &'static str },

    #[error("Invalid request timeout")]
    InvalidTimeout,
}
