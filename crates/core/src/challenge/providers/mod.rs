//! Bundled DNS vendors
//!
//! Available record clients:
//! - [`HetznerClient`] - Hetzner DNS API
//! - [`CloudflareClient`] - Cloudflare API v4
//! - [`WebhookClient`] - Generic webhook for custom providers
//!
//! Each is wrapped in a [`Dns01Provider`] by its constructor below.

mod cloudflare;
mod hetzner;
mod webhook;

pub use cloudflare::CloudflareClient;
pub use hetzner::HetznerClient;
pub use webhook::WebhookClient;

use std::sync::Arc;

use certkeeper_config::{CloudflareDnsConfig, HetznerDnsConfig, ProviderConfig, WebhookDnsConfig};

use super::dns01::Dns01Provider;
use super::provider::{ChallengeError, ChallengeProvider, ChallengeResult};

fn initialization_error(provider: &str, err: reqwest::Error) -> ChallengeError {
    ChallengeError::Initialization {
        provider: provider.to_string(),
        message: format!("Failed to create HTTP client: {}", err),
    }
}

/// Construct the `hetzner` challenge provider
pub fn create_hetzner(config: &ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>> {
    let typed: HetznerDnsConfig = config.parse()?;
    let timing = typed.timing.resolve();

    let client = HetznerClient::new(
        typed.api_token.expose(),
        &typed.api_url,
        timing.request_timeout,
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(Dns01Provider::new(client, timing)))
}

/// Construct the `cloudflare` challenge provider
pub fn create_cloudflare(config: &ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>> {
    let typed: CloudflareDnsConfig = config.parse()?;
    let timing = typed.timing.resolve();

    let client = CloudflareClient::new(
        typed.api_token.expose(),
        typed.zone_id,
        &typed.api_url,
        timing.request_timeout,
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(Dns01Provider::new(client, timing)))
}

/// Construct the `webhook` challenge provider
pub fn create_webhook(config: &ProviderConfig) -> ChallengeResult<Arc<dyn ChallengeProvider>> {
    let typed: WebhookDnsConfig = config.parse()?;
    let timing = typed.timing.resolve();

    let client = WebhookClient::new(
        &typed.url,
        typed.auth_header,
        typed.token.map(|t| t.expose().to_string()),
        timing.request_timeout,
    )
    .map_err(|e| initialization_error(&config.provider, e))?;

    Ok(Arc::new(Dns01Provider::new(client, timing)))
}
