//! SSL deployment provider trait, context, result and errors

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_common::{Classify, ErrorKind};
use certkeeper_config::ConfigError;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::material::CertificateMaterial;
use crate::http;

/// Errors that can occur while deploying certificate material
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    /// Invalid provider configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The vendor client could not be constructed
    #[error("Failed to initialize provider '{provider}': {message}")]
    Initialization { provider: String, message: String },

    /// Malformed PEM or a key that does not match the certificate
    #[error("Invalid certificate material: {0}")]
    InvalidCertificateMaterial(String),

    /// The target rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The region, bucket, function or domain does not exist
    #[error("Deployment target not found: {0}")]
    TargetNotFound(String),

    /// The target throttled the request
    #[error("Rate limited by deployment target")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other rejection
    #[error("Deployment failed: {0}")]
    Deployment(String),

    /// The context was cancelled or its deadline passed
    #[error("Deployment cancelled: {0}")]
    Cancelled(String),
}

impl DeployError {
    /// Map a reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Deployment("request timed out".to_string())
        } else {
            Self::Deployment(format!("request failed: {}", err))
        }
    }

    /// Map a non-success response
    ///
    /// 401/403 are authentication failures, 404 a missing target and 429
    /// throttling (with `Retry-After`); anything else is a deployment error.
    pub async fn from_response(response: Response, target: &str) -> Self {
        let retry_after = http::retry_after(response.headers());
        let (status, body) = http::describe_failure(response).await;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Authentication(format!("HTTP {} - {}", status, body))
            }
            StatusCode::NOT_FOUND => Self::TargetNotFound(format!("{} (HTTP 404 - {})", target, body)),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            _ => Self::Deployment(format!("HTTP {} - {}", status, body)),
        }
    }
}

impl Classify for DeployError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Initialization { .. } => ErrorKind::ProviderInitialization,
            Self::InvalidCertificateMaterial(_) => ErrorKind::InvalidCertificateMaterial,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::TargetNotFound(_) => ErrorKind::TargetNotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Deployment(_) => ErrorKind::Deployment,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Cancellation signal and optional deadline for one deployment
#[derive(Debug, Clone, Default)]
pub struct DeployContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl DeployContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `operation`, dropping it (and its in-flight requests) on
    /// cancellation or when the deadline passes
    pub async fn run<T, F>(&self, operation: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, DeployError>>,
    {
        let bounded = async {
            match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, operation)
                    .await
                    .unwrap_or_else(|_| {
                        Err(DeployError::Cancelled(format!(
                            "deadline of {}s exceeded",
                            timeout.as_secs()
                        )))
                    }),
                None => operation.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled("cancelled by caller".to_string())),
            result = bounded => result,
        }
    }
}

/// Outcome of one deployment
///
/// Immutable once produced; the node executor turns it into output values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    /// Provider that performed the deployment
    pub provider: String,
    pub succeeded: bool,
    /// Vendor metadata (e.g. assigned certificate resource id)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Failure detail when `succeeded` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentResult {
    /// A successful deployment without metadata
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            succeeded: true,
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    /// A failed deployment
    pub fn failure(provider: impl Into<String>, error: &DeployError) -> Self {
        Self {
            provider: provider.into(),
            succeeded: false,
            metadata: BTreeMap::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Installs certificate material into one target system
#[async_trait]
pub trait DeploymentProvider: Send + Sync + Debug {
    /// Returns the provider name (e.g., "aliyun-fc")
    fn name(&self) -> &str;

    /// Identity of the remote resource this provider mutates
    ///
    /// Two deployments with the same key must not overlap.
    fn resource_key(&self) -> String {
        self.name().to_string()
    }

    /// Install the certificate chain and private key
    ///
    /// Both PEM blocks are validated locally (well-formed, matching key)
    /// before any vendor call. Never retried internally.
    async fn deploy(
        &self,
        ctx: &DeployContext,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<DeploymentResult, DeployError>;
}

/// Vendor side of a deployment: receives already validated material
#[async_trait]
pub trait DeployTarget: Send + Sync + Debug {
    /// Returns the vendor name
    fn name(&self) -> &'static str;

    /// Human readable identity of the target (used in logs and lock keys)
    fn target(&self) -> String;

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError>;
}

/// [`DeploymentProvider`] for any [`DeployTarget`]
#[derive(Debug)]
pub struct SslDeployer<T> {
    target: T,
}

impl<T: DeployTarget> SslDeployer<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }
}

#[async_trait]
impl<T: DeployTarget> DeploymentProvider for SslDeployer<T> {
    fn name(&self) -> &str {
        self.target.name()
    }

    fn resource_key(&self) -> String {
        format!("{}:{}", self.target.name(), self.target.target())
    }

    async fn deploy(
        &self,
        ctx: &DeployContext,
        certificate_pem: &str,
        private_key_pem: &str,
    ) -> Result<DeploymentResult, DeployError> {
        let material = CertificateMaterial::parse(certificate_pem, private_key_pem)?;

        if ctx.is_cancelled() {
            return Err(DeployError::Cancelled("cancelled by caller".to_string()));
        }

        debug!(
            provider = %self.target.name(),
            target = %self.target.target(),
            common_name = ?material.common_name(),
            fingerprint = %material.fingerprint(),
            "Deploying certificate"
        );

        let result = ctx.run(self.target.install(&material)).await?;

        info!(
            provider = %self.target.name(),
            target = %self.target.target(),
            not_after = %material.not_after(),
            "Certificate deployed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            DeployError::Authentication("denied".into()).kind(),
            ErrorKind::Authentication
        );
        assert!(!DeployError::Authentication("denied".into())
            .kind()
            .is_retryable());
        assert!(!DeployError::InvalidCertificateMaterial("bad".into())
            .kind()
            .is_retryable());

        let limited = DeployError::RateLimited {
            retry_after: Some(Duration::from_secs(9)),
        };
        assert!(limited.kind().is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(9)));
        assert!(DeployError::Deployment("boom".into()).kind().is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_timeout() {
        let ctx = DeployContext::new().with_timeout(Duration::from_secs(5));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DeployError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_context_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = DeployContext::new().with_cancellation(cancel);

        let err = ctx
            .run(std::future::pending::<Result<(), DeployError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_context_passes_result() {
        let ctx = DeployContext::new();
        let value = ctx.run(async { Ok::<_, DeployError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_result_serialization() {
        let result = DeploymentResult::new("aliyun-fc").with_metadata("certName", "certkeeper-abc");
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["provider"], "aliyun-fc");
        assert_eq!(json["succeeded"], true);
        assert_eq!(json["metadata"]["certName"], "certkeeper-abc");
        assert!(json.get("error").is_none());

        let failed = DeploymentResult::failure("local", &DeployError::Deployment("disk full".into()));
        assert!(!failed.succeeded);
        assert_eq!(failed.error.as_deref(), Some("Deployment failed: disk full"));
    }
}
