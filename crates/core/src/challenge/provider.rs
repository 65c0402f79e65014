//! DNS-01 challenge provider trait and errors
//!
//! Defines the interface that all challenge providers implement, and the
//! helpers computing the challenge record name and value.

use std::fmt::{self, Debug};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use certkeeper_common::{Classify, ErrorKind};
use certkeeper_config::{ConfigError, Timing};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Result type for challenge operations
pub type ChallengeResult<T> = Result<T, ChallengeError>;

/// Why a vendor call failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    /// The vendor rejected the credentials
    Authentication(String),
    /// The vendor throttled the request
    RateLimited { retry_after: Option<Duration> },
    /// The vendor refused the request (bad zone, bad record, server error)
    Rejected(String),
    /// The request never got a usable answer
    Transport(String),
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication(message) => write!(f, "authentication failed: {}", message),
            Self::RateLimited {
                retry_after: Some(after),
            } => write!(f, "rate limited, retry after {}s", after.as_secs()),
            Self::RateLimited { retry_after: None } => f.write_str("rate limited"),
            Self::Rejected(message) => write!(f, "rejected: {}", message),
            Self::Transport(message) => write!(f, "transport failure: {}", message),
        }
    }
}

/// Errors that can occur during challenge operations
#[derive(Debug, Clone, Error)]
pub enum ChallengeError {
    /// Invalid provider configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The vendor client could not be constructed
    #[error("Failed to initialize provider '{provider}': {message}")]
    Initialization { provider: String, message: String },

    /// Creating or upserting the TXT record failed
    #[error("Failed to create TXT record '{record_name}': {detail}")]
    RecordCreation {
        record_name: String,
        detail: FailureDetail,
    },

    /// Removing the TXT record failed
    #[error("Failed to delete TXT record '{record_name}': {detail}")]
    RecordDeletion {
        record_name: String,
        detail: FailureDetail,
    },

    /// The record did not become visible in time
    #[error("TXT record '{record_name}' not visible after {}s", elapsed.as_secs())]
    PropagationTimeout {
        record_name: String,
        elapsed: Duration,
    },

    /// The wait was aborted by the caller
    #[error("Challenge for '{record_name}' cancelled")]
    Cancelled { record_name: String },
}

impl ChallengeError {
    /// The vendor failure detail, for creation and deletion errors
    pub fn detail(&self) -> Option<&FailureDetail> {
        match self {
            Self::RecordCreation { detail, .. } | Self::RecordDeletion { detail, .. } => {
                Some(detail)
            }
            _ => None,
        }
    }
}

impl Classify for ChallengeError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Initialization { .. } => ErrorKind::ProviderInitialization,
            Self::RecordCreation { .. } => ErrorKind::RecordCreation,
            Self::RecordDeletion { .. } => ErrorKind::RecordDeletion,
            Self::PropagationTimeout { .. } => ErrorKind::PropagationTimeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self.detail() {
            Some(FailureDetail::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }
}

/// A DNS-01 challenge solver for one vendor
///
/// Implementations must be thread-safe. Calls for different domains may run
/// concurrently; calls for the same domain are serialized by the caller
/// (see [`KeyedLock`](certkeeper_common::KeyedLock)).
#[async_trait]
pub trait ChallengeProvider: Send + Sync + Debug {
    /// Returns the provider name (e.g., "hetzner", "cloudflare")
    fn name(&self) -> &str;

    /// TTL, propagation timeout and polling interval in effect
    fn timing(&self) -> Timing;

    /// Create (or upsert) the challenge TXT record
    ///
    /// Returns once the vendor accepted the record. Does not wait for the
    /// record to resolve.
    async fn present(&self, domain: &str, token: &str, key_authorization: &str)
        -> ChallengeResult<()>;

    /// Remove the record created by [`present`](Self::present)
    ///
    /// Idempotent: a record that no longer exists is a success.
    async fn clean_up(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> ChallengeResult<()>;
}

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Strip the wildcard prefix and any trailing root dot
///
/// `*.example.com` and `example.com.` both become `example.com`.
pub fn normalize_domain(domain: &str) -> &str {
    let domain = domain.trim();
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    domain.strip_suffix('.').unwrap_or(domain)
}

/// Build the full ACME challenge record name
///
/// For `example.com` and `*.example.com`, returns `_acme-challenge.example.com`
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain))
}

/// Compute the DNS-01 TXT value: base64url (unpadded) SHA-256 of the key authorization
pub fn compute_challenge_value(key_authorization: &str) -> String {
    let digest = Sha256::digest(key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
