//! Configuration error type

use certkeeper_common::{Classify, ErrorKind};
use thiserror::Error;

/// Errors raised while turning a [`ProviderConfig`](crate::ProviderConfig)
/// into a typed vendor configuration
///
/// Every variant classifies as [`ErrorKind::Configuration`]: it is surfaced
/// immediately and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A credential or target selector is empty or absent
    #[error("provider '{provider}': missing required field '{field}'")]
    MissingField { provider: String, field: String },

    /// A field is present but malformed
    #[error("provider '{provider}': invalid field '{field}': {message}")]
    InvalidField {
        provider: String,
        field: String,
        message: String,
    },

    /// No constructor is registered for the declared vendor
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    /// The vendor config document does not have the expected shape
    #[error("provider '{provider}': malformed configuration: {message}")]
    Parse { provider: String, message: String },

    /// An `env:` or `file:` secret reference could not be resolved
    #[error("provider '{provider}': cannot resolve secret '{field}': {message}")]
    Secret {
        provider: String,
        field: String,
        message: String,
    },
}

impl ConfigError {
    /// The field this error names, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. }
            | Self::InvalidField { field, .. }
            | Self::Secret { field, .. } => Some(field),
            Self::UnknownProvider(_) | Self::Parse { .. } => None,
        }
    }
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field() {
        let err = ConfigError::MissingField {
            provider: "hetzner".to_string(),
            field: "api_token".to_string(),
        };
        assert!(err.to_string().contains("api_token"));
        assert!(err.to_string().contains("hetzner"));
        assert_eq!(err.field(), Some("api_token"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_unknown_provider_has_no_field() {
        let err = ConfigError::UnknownProvider("route53".to_string());
        assert_eq!(err.field(), None);
        assert!(err.to_string().contains("route53"));
    }
}
