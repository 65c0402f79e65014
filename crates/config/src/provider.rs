//! The provider configuration envelope
//!
//! Every provider, challenge or deployment, is declared as
//!
//! ```json
//! { "provider": "hetzner", "config": { "apiToken": "env:HETZNER_TOKEN" } }
//! ```
//!
//! The registry looks up the constructor by `provider`; the constructor
//! calls [`ProviderConfig::parse`] to obtain its typed, validated and
//! secret-resolved vendor config.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use validator::Validate;

use crate::error::ConfigError;
use crate::secret::Secret;
use crate::validation::to_config_error;

/// Declared vendor identity plus its vendor-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry key of the vendor (e.g. `hetzner`, `aliyun-fc`)
    pub provider: String,

    /// Vendor-specific settings
    #[serde(default)]
    pub config: Value,
}

/// A typed vendor configuration
pub trait VendorConfig: DeserializeOwned + Validate {
    /// Replace `env:`/`file:` references with their values
    fn resolve_secrets(&mut self, _provider: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl ProviderConfig {
    pub fn new(provider: impl Into<String>, config: Value) -> Self {
        Self {
            provider: provider.into(),
            config,
        }
    }

    /// Deserialize, validate and resolve secrets, in that order
    ///
    /// Never touches the network; any failure is a [`ConfigError`].
    pub fn parse<T: VendorConfig>(&self) -> Result<T, ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::MissingField {
                provider: String::new(),
                field: "provider".to_string(),
            });
        }

        let document = match &self.config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let mut typed: T = serde_json::from_value(document).map_err(|e| ConfigError::Parse {
            provider: self.provider.clone(),
            message: e.to_string(),
        })?;

        typed
            .validate()
            .map_err(|e| to_config_error(&self.provider, &e))?;

        typed.resolve_secrets(&self.provider)?;

        debug!(provider = %self.provider, "Parsed provider configuration");
        Ok(typed)
    }
}

/// Resolve one secret field in place
pub fn resolve_secret(provider: &str, field: &str, secret: &mut Secret) -> Result<(), ConfigError> {
    *secret = secret.resolve().map_err(|message| ConfigError::Secret {
        provider: provider.to_string(),
        field: field.to_string(),
        message,
    })?;
    Ok(())
}

/// Resolve an optional secret field in place
pub fn resolve_optional_secret(
    provider: &str,
    field: &str,
    secret: &mut Option<Secret>,
) -> Result<(), ConfigError> {
    match secret {
        Some(value) if !value.is_blank() => resolve_secret(provider, field, value),
        Some(_) => {
            *secret = None;
            Ok(())
        }
        None => Ok(()),
    }
}

/// Load a JSON array of provider envelopes from a file
///
/// Only the document shape is checked here; vendor settings are validated
/// when each provider is constructed.
pub fn load_provider_configs(path: impl AsRef<Path>) -> anyhow::Result<Vec<ProviderConfig>> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read provider config file {}", path.display()))?;

    let configs: Vec<ProviderConfig> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse provider config file {}", path.display()))?;

    if let Some(position) = configs.iter().position(|c| c.provider.trim().is_empty()) {
        anyhow::bail!(
            "Provider config file {}: entry {} has an empty 'provider'",
            path.display(),
            position
        );
    }

    info!(
        path = %path.display(),
        providers = configs.len(),
        "Loaded provider configurations"
    );
    Ok(configs)
}
