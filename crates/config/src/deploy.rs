//! SSL deployment vendor configurations

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ConfigError;
use crate::provider::{resolve_optional_secret, resolve_secret, VendorConfig};
use crate::secret::Secret;
use crate::timing::DEFAULT_REQUEST_TIMEOUT;
use crate::validation::{validate_http_url, validate_non_blank, validate_path, validate_secret};

/// `aliyun-fc` deployment provider: Function Compute 3.0 custom domain
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AliyunFcConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub access_key_id: Secret,

    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub access_key_secret: Secret,

    #[serde(default)]
    #[validate(custom(function = "validate_non_blank"))]
    pub region: String,

    /// Custom domain whose certificate is replaced
    #[serde(default)]
    #[validate(custom(function = "validate_non_blank"))]
    pub domain: String,

    /// Overrides `https://fcv3.<region>.aliyuncs.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_http_url"))]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
}

impl AliyunFcConfig {
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://fcv3.{}.aliyuncs.com", self.region.trim()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        request_timeout(self.request_timeout_seconds)
    }
}

impl VendorConfig for AliyunFcConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        resolve_secret(provider, "accessKeyId", &mut self.access_key_id)?;
        resolve_secret(provider, "accessKeySecret", &mut self.access_key_secret)
    }
}

/// `aliyun-oss` deployment provider: custom domain bound to an OSS bucket
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AliyunOssConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub access_key_id: Secret,

    #[serde(default)]
    #[validate(custom(function = "validate_secret"))]
    pub access_key_secret: Secret,

    #[serde(default)]
    #[validate(custom(function = "validate_non_blank"))]
    pub region: String,

    #[serde(default)]
    #[validate(custom(function = "validate_non_blank"))]
    pub bucket: String,

    /// Custom domain already attached to the bucket
    #[serde(default)]
    #[validate(custom(function = "validate_non_blank"))]
    pub domain: String,

    /// Overrides `https://<bucket>.oss-<region>.aliyuncs.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_http_url"))]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
}

impl AliyunOssConfig {
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.oss-{}.aliyuncs.com",
                self.bucket.trim(),
                self.region.trim()
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        request_timeout(self.request_timeout_seconds)
    }
}

impl VendorConfig for AliyunOssConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        resolve_secret(provider, "accessKeyId", &mut self.access_key_id)?;
        resolve_secret(provider, "accessKeySecret", &mut self.access_key_secret)
    }
}

/// `webhook` deployment provider
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDeployConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_http_url"))]
    pub url: String,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Sent as `Authorization: Bearer <token>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Secret>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
}

impl WebhookDeployConfig {
    pub fn request_timeout(&self) -> Duration {
        request_timeout(self.request_timeout_seconds)
    }
}

impl VendorConfig for WebhookDeployConfig {
    fn resolve_secrets(&mut self, provider: &str) -> Result<(), ConfigError> {
        resolve_optional_secret(provider, "token", &mut self.token)
    }
}

/// `local` deployment provider: certificate and key files on this host
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocalDeployConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_path"))]
    pub cert_path: PathBuf,

    #[serde(default)]
    #[validate(custom(function = "validate_path"))]
    pub key_path: PathBuf,
}

impl VendorConfig for LocalDeployConfig {}

fn request_timeout(seconds: Option<u64>) -> Duration {
    seconds
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
}
