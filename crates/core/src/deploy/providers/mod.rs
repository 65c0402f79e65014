//! Bundled deployment targets
//!
//! Available targets:
//! - [`AliyunFcTarget`] - Alibaba Cloud Function Compute custom domains
//! - [`AliyunOssTarget`] - Alibaba Cloud OSS bucket custom domains
//! - [`WebhookTarget`] - Generic webhook for custom integrations
//! - [`LocalTarget`] - Certificate and key files on this host
//!
//! Each is wrapped in an [`SslDeployer`] by its constructor below.

mod aliyun_fc;
mod aliyun_oss;
mod local;
mod webhook;

pub use aliyun_fc::{AliyunFcTarget, FC_API_VERSION};
pub use aliyun_oss::AliyunOssTarget;
pub use local::LocalTarget;
pub use webhook::WebhookTarget;

use std::sync::Arc;

use certkeeper_config::{
    AliyunFcConfig, AliyunOssConfig, LocalDeployConfig, ProviderConfig, WebhookDeployConfig,
};

use super::provider::{DeployError, DeploymentProvider, SslDeployer};

fn initialization_error(provider: &str, err: reqwest::Error) -> DeployError {
    DeployError::Initialization {
        provider: provider.to_string(),
        message: format!("Failed to create HTTP client: {}", err),
    }
}

/// Construct the `aliyun-fc` deployment provider
pub fn create_aliyun_fc(config: &ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> {
    let typed: AliyunFcConfig = config.parse()?;

    let target = AliyunFcTarget::new(
        typed.access_key_id.expose(),
        typed.access_key_secret.expose(),
        &typed.endpoint(),
        &typed.domain,
        typed.request_timeout(),
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(SslDeployer::new(target)))
}

/// Construct the `aliyun-oss` deployment provider
pub fn create_aliyun_oss(config: &ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> {
    let typed: AliyunOssConfig = config.parse()?;

    let target = AliyunOssTarget::new(
        typed.access_key_id.expose(),
        typed.access_key_secret.expose(),
        &typed.endpoint(),
        &typed.bucket,
        &typed.domain,
        typed.request_timeout(),
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(SslDeployer::new(target)))
}

/// Construct the `webhook` deployment provider
pub fn create_webhook(config: &ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> {
    let typed: WebhookDeployConfig = config.parse()?;
    let timeout = typed.request_timeout();

    let target = WebhookTarget::new(
        &typed.url,
        typed.headers,
        typed.token.map(|t| t.expose().to_string()),
        timeout,
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(SslDeployer::new(target)))
}

/// Construct the `local` deployment provider
pub fn create_local(config: &ProviderConfig) -> Result<Arc<dyn DeploymentProvider>, DeployError> {
    let typed: LocalDeployConfig = config.parse()?;
    Ok(Arc::new(SslDeployer::new(LocalTarget::new(
        typed.cert_path,
        typed.key_path,
    ))))
}
