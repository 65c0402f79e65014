//! Maps declared vendor names to deployment provider constructors

use std::sync::Arc;

use certkeeper_common::Registry;
use certkeeper_config::{ConfigError, ProviderConfig};
use tracing::debug;

use super::provider::{DeployError, DeploymentProvider};
use super::providers;

/// Constructor for one deployment vendor
pub type DeployFactory =
    dyn Fn(&ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> + Send + Sync;

/// Registry of deployment provider constructors
#[derive(Clone, Default)]
pub struct DeploymentProviderRegistry {
    factories: Registry<DeployFactory>,
}

impl DeploymentProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with `aliyun-fc`, `aliyun-oss`, `local` and `webhook`
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("aliyun-fc", providers::create_aliyun_fc);
        registry.register("aliyun-oss", providers::create_aliyun_oss);
        registry.register("local", providers::create_local);
        registry.register("webhook", providers::create_webhook);
        registry
    }

    /// Register (or replace) the constructor for `name`
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError>
            + Send
            + Sync
            + 'static,
    {
        if self.factories.insert(name, Arc::new(factory)).is_some() {
            debug!(provider = %name, "Replaced deployment provider constructor");
        }
    }

    /// Build the provider declared by `config`
    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> {
        let factory = self
            .factories
            .get(&config.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(config.provider.clone()))?;

        let provider = factory(config)?;
        debug!(
            provider = %config.provider,
            resource = %provider.resource_key(),
            "Constructed deployment provider"
        );
        Ok(provider)
    }

    /// Registered vendor names, sorted
    pub fn names(&self) -> Vec<String> {
        self.factories.keys()
    }
}

impl std::fmt::Debug for DeploymentProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certkeeper_common::{Classify, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_builtin_names() {
        let registry = DeploymentProviderRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["aliyun-fc", "aliyun-oss", "local", "webhook"]);
    }

    #[test]
    fn test_unknown_provider() {
        let registry = DeploymentProviderRegistry::with_builtin();
        let err = registry
            .create(&ProviderConfig::new("qiniu", json!({})))
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::Configuration(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_missing_fields_are_configuration_errors() {
        let registry = DeploymentProviderRegistry::with_builtin();
        for name in ["aliyun-fc", "aliyun-oss", "local", "webhook"] {
            let err = registry
                .create(&ProviderConfig::new(name, json!({})))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "provider {}", name);
        }
    }

    #[test]
    fn test_aliyun_resource_key() {
        let registry = DeploymentProviderRegistry::with_builtin();
        let provider = registry
            .create(&ProviderConfig::new(
                "aliyun-fc",
                json!({
                    "accessKeyId": "ak",
                    "accessKeySecret": "sk",
                    "region": "cn-hangzhou",
                    "domain": "api.example.com"
                }),
            ))
            .unwrap();

        assert_eq!(provider.name(), "aliyun-fc");
        assert_eq!(
            provider.resource_key(),
            "aliyun-fc:fcv3.cn-hangzhou.aliyuncs.com/api.example.com"
        );
    }

    #[test]
    fn test_aliyun_oss_resource_key() {
        let registry = DeploymentProviderRegistry::with_builtin();
        let provider = registry
            .create(&ProviderConfig::new(
                "aliyun-oss",
                json!({
                    "accessKeyId": "ak",
                    "accessKeySecret": "sk",
                    "region": "cn-hangzhou",
                    "bucket": "assets",
                    "domain": "cdn.example.com"
                }),
            ))
            .unwrap();

        assert_eq!(provider.name(), "aliyun-oss");
        assert_eq!(provider.resource_key(), "aliyun-oss:assets/cdn.example.com");
    }

    #[test]
    fn test_custom_factory() {
        let registry = DeploymentProviderRegistry::new();
        registry.register("noop", |_config: &ProviderConfig| {
            Err(DeployError::Initialization {
                provider: "noop".to_string(),
                message: "not available".to_string(),
            })
        });

        let err = registry
            .create(&ProviderConfig::new("noop", json!({})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderInitialization);
    }
}
