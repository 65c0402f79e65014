//! Maps declared vendor names to challenge provider constructors

use std::sync::Arc;

use certkeeper_common::Registry;
use certkeeper_config::{ConfigError, ProviderConfig};
use tracing::debug;

use super::provider::{ChallengeProvider, ChallengeResult};
use super::providers;

/// Constructor for one challenge vendor
pub type ChallengeFactory =
    dyn Fn(&ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>> + Send + Sync;

/// Registry of challenge provider constructors
#[derive(Clone, Default)]
pub struct ChallengeProviderRegistry {
    factories: Registry<ChallengeFactory>,
}

impl ChallengeProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `hetzner`, `cloudflare` and `webhook`
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("hetzner", providers::create_hetzner);
        registry.register("cloudflare", providers::create_cloudflare);
        registry.register("webhook", providers::create_webhook);
        registry
    }

    /// Register (or replace) the constructor for `name`
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>>
            + Send
            + Sync
            + 'static,
    {
        if self.factories.insert(name, Arc::new(factory)).is_some() {
            debug!(provider = %name, "Replaced challenge provider constructor");
        }
    }

    /// Build the provider declared by `config`
    pub fn create(&self, config: &ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>> {
        let factory = self
            .factories
            .get(&config.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(config.provider.clone()))?;

        let provider = factory(config)?;
        debug!(provider = %config.provider, "Constructed challenge provider");
        Ok(provider)
    }

    /// Registered vendor names, sorted
    pub fn names(&self) -> Vec<String> {
        self.factories.keys()
    }
}

impl std::fmt::Debug for ChallengeProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::provider::ChallengeError;
    use certkeeper_common::{Classify, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_builtin_names() {
        let registry = ChallengeProviderRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["cloudflare", "hetzner", "webhook"]);
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ChallengeProviderRegistry::with_builtin();
        let err = registry
            .create(&ProviderConfig::new("route53", json!({})))
            .unwrap_err();

        assert!(matches!(
            err,
            ChallengeError::Configuration(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_missing_credentials_fail_before_network() {
        let registry = ChallengeProviderRegistry::with_builtin();
        for name in ["hetzner", "cloudflare", "webhook"] {
            let err = registry
                .create(&ProviderConfig::new(name, json!({})))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "provider {}", name);
        }
    }

    #[test]
    fn test_valid_config_constructs() {
        let registry = ChallengeProviderRegistry::with_builtin();
        let provider = registry
            .create(&ProviderConfig::new(
                "hetzner",
                json!({"apiToken": "token", "ttlSeconds": 120}),
            ))
            .unwrap();

        assert_eq!(provider.name(), "hetzner");
        assert_eq!(provider.timing().ttl, 120);
        assert_eq!(provider.timing().polling_interval.as_secs(), 2);
    }
}
