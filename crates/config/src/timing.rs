//! Timing parameters shared by every provider family
//!
//! Vendor configs embed [`TimingConfig`] (all fields optional, zero means
//! unset). Construction resolves it into [`Timing`] with the defaults
//! filled in.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TTL of challenge TXT records, in seconds
pub const DEFAULT_TTL_SECS: u32 = 600;

/// Default time to wait for a TXT record to become visible
pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between two propagation lookups
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);

/// Default timeout of a single vendor API request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing fields as they appear in a vendor config document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// Record TTL in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u32>,

    /// How long the propagation verifier waits, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_timeout_seconds: Option<u64>,

    /// Delay between propagation lookups, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_seconds: Option<u64>,

    /// Timeout of one vendor HTTP request, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
}

/// Resolved timing with every default applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub ttl: u32,
    pub propagation_timeout: Duration,
    pub polling_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL_SECS,
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl TimingConfig {
    /// Fill unset (absent or zero) fields with the defaults
    pub fn resolve(&self) -> Timing {
        let defaults = Timing::default();

        Timing {
            ttl: self.ttl_seconds.filter(|v| *v > 0).unwrap_or(defaults.ttl),
            propagation_timeout: non_zero_secs(self.propagation_timeout_seconds)
                .unwrap_or(defaults.propagation_timeout),
            polling_interval: non_zero_secs(self.polling_interval_seconds)
                .unwrap_or(defaults.polling_interval),
            request_timeout: non_zero_secs(self.request_timeout_seconds)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

fn non_zero_secs(value: Option<u64>) -> Option<Duration> {
    value.filter(|v| *v > 0).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let timing = TimingConfig::default().resolve();
        assert_eq!(timing.ttl, 600);
        assert_eq!(timing.propagation_timeout, Duration::from_secs(60));
        assert_eq!(timing.polling_interval, Duration::from_secs(2));
        assert_eq!(timing.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_counts_as_unset() {
        let config = TimingConfig {
            ttl_seconds: Some(0),
            propagation_timeout_seconds: Some(0),
            polling_interval_seconds: Some(0),
            request_timeout_seconds: Some(0),
        };
        assert_eq!(config.resolve(), Timing::default());
    }

    #[test]
    fn test_overrides_win() {
        let config: TimingConfig = serde_json::from_str(
            r#"{"ttlSeconds": 120, "propagationTimeoutSeconds": 300, "pollingIntervalSeconds": 5}"#,
        )
        .unwrap();
        let timing = config.resolve();

        assert_eq!(timing.ttl, 120);
        assert_eq!(timing.propagation_timeout, Duration::from_secs(300));
        assert_eq!(timing.polling_interval, Duration::from_secs(5));
        assert_eq!(timing.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
