//! Error classification for certkeeper
//!
//! Every error raised by a provider, the output store, or the node executor
//! maps onto one [`ErrorKind`]. Callers make retry decisions from the kind
//! instead of inspecting error messages.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The closed set of failure kinds a workflow node can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required field is missing or malformed
    Configuration,
    /// The vendor client could not be constructed
    ProviderInitialization,
    /// Creating the challenge TXT record failed
    RecordCreation,
    /// Removing the challenge TXT record failed
    RecordDeletion,
    /// The TXT record never became visible before the deadline
    PropagationTimeout,
    /// Certificate or key PEM is malformed, or the key does not match
    InvalidCertificateMaterial,
    /// The vendor rejected the credentials
    Authentication,
    /// The region, bucket, function or domain does not exist
    TargetNotFound,
    /// The vendor throttled the request
    RateLimited,
    /// Any other vendor-side rejection during deployment
    Deployment,
    /// Output records could not be persisted
    Persistence,
    /// The caller cancelled the operation
    Cancelled,
}

impl ErrorKind {
    /// Whether the node executor may retry an operation that failed with this kind
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RecordCreation | Self::RecordDeletion | Self::RateLimited | Self::Deployment
        )
    }

    /// Whether this kind aborts the whole workflow run rather than a single node
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Persistence | Self::Cancelled)
    }

    /// Stable snake_case name, used in persisted outputs and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::ProviderInitialization => "provider_initialization",
            Self::RecordCreation => "record_creation",
            Self::RecordDeletion => "record_deletion",
            Self::PropagationTimeout => "propagation_timeout",
            Self::InvalidCertificateMaterial => "invalid_certificate_material",
            Self::Authentication => "authentication",
            Self::TargetNotFound => "target_not_found",
            Self::RateLimited => "rate_limited",
            Self::Deployment => "deployment",
            Self::Persistence => "persistence",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every certkeeper error type
pub trait Classify {
    /// The kind the executor uses for retry decisions
    fn kind(&self) -> ErrorKind;

    /// Minimum delay requested by the vendor before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
