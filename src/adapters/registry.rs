//! Tier-to-adapter resolution with a client cache.
//!
//! Adapters hold connection pools, so one instance per (provider, model)
//! pair is built lazily and reused for the lifetime of the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{EngineConfig, ProviderId, TierConfig};
use crate::ports::{ChatModel, ModelResolver, ResolveError};

use super::{GatewayConfig, GatewayModel, GeminiConfig, GeminiModel};

/// Config-driven [`ModelResolver`] over the real provider adapters.
pub struct ModelRegistry {
    config: EngineConfig,
    cache: Mutex<HashMap<(ProviderId, String), Arc<dyn ChatModel>>>,
}

impl ModelRegistry {
    /// Creates a registry. Credentials are read from `config` at resolve
    /// time, so a registry over a partially configured engine only fails for
    /// tiers that actually lack a key.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn build(&self, tier: &TierConfig) -> Result<Arc<dyn ChatModel>, ResolveError> {
        let missing = || ResolveError::MissingCredential {
            provider: tier.provider.as_str().to_string(),
        };

        match tier.provider {
            ProviderId::Gemini => {
                let key = self
                    .config
                    .gemini_api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(missing)?;
                let adapter = GeminiModel::new(
                    GeminiConfig::new(key, &tier.model)
                        .with_base_url(&self.config.gemini_base_url)
                        .with_timeout(self.config.timeout()),
                )
                .map_err(|e| ResolveError::ClientBuild(e.to_string()))?;
                Ok(Arc::new(adapter))
            }
            ProviderId::Gateway => {
                let key = self
                    .config
                    .gateway_api_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(missing)?;
                let adapter = GatewayModel::new(
                    GatewayConfig::new(key, &tier.model)
                        .with_base_url(&self.config.gateway_base_url)
                        .with_timeout(self.config.timeout()),
                )
                .map_err(|e| ResolveError::ClientBuild(e.to_string()))?;
                Ok(Arc::new(adapter))
            }
        }
    }
}

impl ModelResolver for ModelRegistry {
    fn resolve(&self, tier: &TierConfig) -> Result<Arc<dyn ChatModel>, ResolveError> {
        let cache_key = (tier.provider, tier.model.clone());

        if let Ok(cache) = self.cache.lock() {
            if let Some(model) = cache.get(&cache_key) {
                return Ok(Arc::clone(model));
            }
        }

        let model = self.build(tier)?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(cache_key, Arc::clone(&model));
        }
        Ok(model)
    }
}
