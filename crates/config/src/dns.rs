//! DNS-01 challenge vendor configurations

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::provider::{resolve_optional_secret, resolve_secret, VendorConfig};
use crate::secret::Secret;
use crate::timing::TimingConfig;
use crate::validation::{validate_http_url, validate_secret};

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

/// Cloudflare API v4 base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

fn default_hetzner_api_url() -> String {
    HETZNER_API_BASE.to_string()
}

fn default_cloudflare_api_url() -> String {
    CLOUDFLARE_API_BASE.to_string()
}

/// `hetzner` challenge provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HetznerDnsConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub api_token: Secret,

    #[serde(default = "default_hetzner_api_url")]
    #[validate(custom(function = "validate_http_url"))]
    pub api_url: String,

    #[serde(flatten)]
    pub timing: TimingConfig,
}

impl VendorConfig for HetznerDnsConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        resolve_secret(provider, "apiToken", &mut self.api_token)
    }
}

/// `cloudflare` challenge provider
///
/// Without `zoneId` the zone is found by walking the domain's parents
/// against `GET /zones?name=`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareDnsConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub api_token: Secret,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,

    #[serde(default = "default_cloudflare_api_url")]
    #[validate(custom(function = "validate_http_url"))]
    pub api_url: String,

    #[serde(flatten)]
    pub timing: TimingConfig,
}

impl VendorConfig for CloudflareDnsConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        if self.zone_id.as_deref().is_some_and(|z| z.trim().is_empty()) {
            self.zone_id = None;
        }
        resolve_secret(provider, "apiToken", &mut self.api_token)
    }
}

/// `webhook` challenge provider
///
/// The token is sent as `Bearer <token>` in `authHeader`
/// (default `Authorization`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDnsConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_http_url"))]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Secret>,

    #[serde(flatten)]
    pub timing: TimingConfig,
}

impl VendorConfig for WebhookDnsConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        resolve_optional_secret(provider, "token", &mut self.token)
    }
}
