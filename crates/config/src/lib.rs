//! Provider configuration for certkeeper
//!
//! Each provider is declared with a [`ProviderConfig`] envelope naming the
//! vendor and carrying its settings. Constructors turn the envelope into a
//! typed vendor config with [`ProviderConfig::parse`], which:
//!
//! 1. deserializes the vendor document (camelCase keys),
//! 2. rejects empty credentials and target selectors with
//!    [`ConfigError::MissingField`],
//! 3. resolves `env:`/`file:` secret references.
//!
//! Timing defaults (TTL 600s, propagation timeout 60s, polling interval 2s)
//! are applied by [`TimingConfig::resolve`].

pub mod deploy;
pub mod dns;
pub mod error;
pub mod provider;
pub mod secret;
pub mod timing;
pub mod validation;

pub use deploy::{AliyunFcConfig, AliyunOssConfig, LocalDeployConfig, WebhookDeployConfig};
pub use dns::{CloudflareDnsConfig, HetznerDnsConfig, WebhookDnsConfig};
pub use error::ConfigError;
pub use provider::{load_provider_configs, ProviderConfig, VendorConfig};
pub use secret::Secret;
pub use timing::{Timing, TimingConfig};
