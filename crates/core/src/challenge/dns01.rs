//! Generic DNS-01 challenge provider over a vendor record client
//!
//! Vendors only implement [`DnsRecordClient`] (find, create, delete TXT
//! records). [`Dns01Provider`] adds the challenge semantics on top:
//! record naming, upsert on present, idempotent clean up and the
//! per-challenge state machine.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use certkeeper_config::Timing;
use parking_lot::Mutex;
use reqwest::{Response, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use super::provider::{
    challenge_record_fqdn, compute_challenge_value, ChallengeError, ChallengeProvider,
    ChallengeResult, FailureDetail,
};
use crate::http;

/// Result type for vendor DNS API calls
pub type DnsResult<T> = Result<T, DnsClientError>;

/// Errors reported by a vendor DNS API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DnsClientError {
    /// Authentication failed with the DNS provider
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// No zone managed by the account covers the domain
    #[error("Zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// API request failed with a non-success status
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited by provider
    #[error("Rate limited by DNS provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection or decoding failure
    #[error("Request failed: {0}")]
    Transport(String),
}

impl DnsClientError {
    /// Map a reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }

    /// Map a non-success response
    pub async fn from_response(response: Response) -> Self {
        let retry_after = http::retry_after(response.headers());
        let (status, body) = http::describe_failure(response).await;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Authentication(format!("HTTP {} - {}", status, body))
            }
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            _ => Self::Api {
                status: status.as_u16(),
                message: body,
            },
        }
    }

    fn into_detail(self) -> FailureDetail {
        match self {
            Self::Authentication(message) => FailureDetail::Authentication(message),
            Self::RateLimited { retry_after } => FailureDetail::RateLimited { retry_after },
            Self::ZoneNotFound { .. } | Self::Api { .. } => FailureDetail::Rejected(self.to_string()),
            Self::Timeout | Self::Transport(_) => FailureDetail::Transport(self.to_string()),
        }
    }
}

/// A TXT record as reported by the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    /// Vendor-assigned record identifier
    pub id: String,
    /// Fully-qualified record name
    pub fqdn: String,
    /// Record value, unquoted
    pub value: String,
}

/// Minimal TXT record API a vendor must offer
///
/// Record names are always fully qualified (`_acme-challenge.example.com`);
/// clients translate to zone-relative names when their API needs it.
#[async_trait]
pub trait DnsRecordClient: Send + Sync + Debug {
    /// Returns the vendor name (e.g., "hetzner")
    fn name(&self) -> &'static str;

    /// All TXT records named `fqdn`
    async fn find_txt_records(&self, fqdn: &str) -> DnsResult<Vec<TxtRecord>>;

    /// Create a TXT record, returning its vendor identifier
    async fn create_txt_record(&self, fqdn: &str, value: &str, ttl: u32) -> DnsResult<String>;

    /// Delete a TXT record by identifier
    ///
    /// Must not error if the record doesn't exist.
    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> DnsResult<()>;
}

/// Lifecycle of one challenge record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    /// Present was called, the vendor has not confirmed yet
    Created,
    /// The vendor holds the record
    Presented,
}

#[derive(Debug, Clone)]
struct ChallengeRecord {
    record_id: Option<String>,
    state: ChallengeState,
}

/// [`ChallengeProvider`] for any vendor with a [`DnsRecordClient`]
#[derive(Debug)]
pub struct Dns01Provider<C> {
    client: C,
    timing: Timing,
    /// (fqdn, value) -> record, for records created by this instance
    records: Mutex<HashMap<(String, String), ChallengeRecord>>,
}

impl<C: DnsRecordClient> Dns01Provider<C> {
    pub fn new(client: C, timing: Timing) -> Self {
        Self {
            client,
            timing,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// State of the challenge for `domain` and `key_authorization`.
    ///
    /// `None` once the record has been cleaned up.
    pub fn state(&self, domain: &str, key_authorization: &str) -> Option<ChallengeState> {
        let key = (
            challenge_record_fqdn(domain),
            compute_challenge_value(key_authorization),
        );
        self.records.lock().get(&key).map(|r| r.state)
    }

    fn set_state(&self, key: &(String, String), state: ChallengeState, record_id: Option<String>) {
        self.records
            .lock()
            .insert(key.clone(), ChallengeRecord { record_id, state });
    }
}

#[async_trait]
impl<C: DnsRecordClient> ChallengeProvider for Dns01Provider<C> {
    fn name(&self) -> &str {
        self.client.name()
    }

    fn timing(&self) -> Timing {
        self.timing
    }

    async fn present(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> ChallengeResult<()> {
        let fqdn = challenge_record_fqdn(domain);
        let value = compute_challenge_value(key_authorization);
        let key = (fqdn.clone(), value.clone());

        let creation_error = |e: DnsClientError| ChallengeError::RecordCreation {
            record_name: fqdn.clone(),
            detail: e.into_detail(),
        };

        let previous = self.records.lock().get(&key).cloned();
        if previous.is_none() {
            self.set_state(&key, ChallengeState::Created, None);
        }

        info!(
            domain = %domain,
            record = %fqdn,
            provider = %self.client.name(),
            "Presenting DNS-01 challenge record"
        );

        let existing = match self.client.find_txt_records(&fqdn).await {
            Ok(records) => records,
            Err(e) => {
                self.restore(&key, previous);
                return Err(creation_error(e));
            }
        };

        let record_id = match existing.into_iter().find(|r| r.value == value) {
            Some(record) => {
                debug!(record = %fqdn, record_id = %record.id, "TXT record already present");
                record.id
            }
            None => match self
                .client
                .create_txt_record(&fqdn, &value, self.timing.ttl)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    self.restore(&key, previous);
                    return Err(creation_error(e));
                }
            },
        };

        debug!(record = %fqdn, record_id = %record_id, "TXT record presented");
        self.set_state(&key, ChallengeState::Presented, Some(record_id));
        Ok(())
    }

    async fn clean_up(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> ChallengeResult<()> {
        let fqdn = challenge_record_fqdn(domain);
        let value = compute_challenge_value(key_authorization);
        let key = (fqdn.clone(), value.clone());

        let deletion_error = |e: DnsClientError| ChallengeError::RecordDeletion {
            record_name: fqdn.clone(),
            detail: e.into_detail(),
        };

        let known = self.records.lock().get(&key).cloned();

        let record_ids = match known {
            Some(ChallengeRecord {
                record_id: Some(id),
                ..
            }) => vec![id],
            _ => self
                .client
                .find_txt_records(&fqdn)
                .await
                .map_err(deletion_error)?
                .into_iter()
                .filter(|r| r.value == value)
                .map(|r| r.id)
                .collect(),
        };

        if record_ids.is_empty() {
            debug!(record = %fqdn, "No matching TXT record to clean up");
        }

        for record_id in &record_ids {
            self.client
                .delete_txt_record(&fqdn, record_id)
                .await
                .map_err(deletion_error)?;
        }

        info!(
            domain = %domain,
            record = %fqdn,
            removed = record_ids.len(),
            "DNS-01 challenge record cleaned up"
        );
        self.records.lock().remove(&key);
        Ok(())
    }
}

impl<C> Dns01Provider<C> {
    fn restore(&self, key: &(String, String), previous: Option<ChallengeRecord>) {
        let mut records = self.records.lock();
        match previous {
            Some(record) => {
                records.insert(key.clone(), record);
            }
            None => {
                records.remove(key);
            }
        }
    }
}
