//! SSL certificate deployment
//!
//! This module provides:
//! - [`DeploymentProvider`]: installs a certificate chain and private key
//!   into one target system
//! - [`CertificateMaterial`]: local validation run before any vendor call
//! - [`SslDeployer`]: the provider for any [`DeployTarget`]
//! - [`DeploymentProviderRegistry`]: constructs providers by vendor name
//!
//! # Example
//!
//! ```ignore
//! let registry = DeploymentProviderRegistry::with_builtin();
//! let provider = registry.create(&ProviderConfig::new(
//!     "local",
//!     json!({"certPath": "/etc/ssl/site.pem", "keyPath": "/etc/ssl/site.key"}),
//! ))?;
//!
//! let result = provider
//!     .deploy(&DeployContext::new(), &bundle.certificate, &bundle.private_key)
//!     .await?;
//! ```

pub mod material;
pub mod provider;
pub mod providers;
pub mod registry;

pub use material::CertificateMaterial;
pub use provider::{
    DeployContext, DeployError, DeployTarget, DeploymentProvider, DeploymentResult, SslDeployer,
};
pub use providers::{AliyunFcTarget, LocalTarget, WebhookTarget, FC_API_VERSION};
pub use registry::{DeployFactory, DeploymentProviderRegistry};
