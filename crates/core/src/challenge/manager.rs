//! DNS-01 challenge management
//!
//! Orchestrates one challenge cycle per domain:
//! 1. Present the TXT record via the challenge provider
//! 2. Wait for propagation
//! 3. Let the caller trigger validation (ACME is outside this crate)
//! 4. Clean up the record, whether or not the previous steps succeeded

use std::future::Future;
use std::sync::Arc;

use certkeeper_common::KeyedLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::propagation::PropagationChecker;
use super::provider::{
    challenge_record_fqdn, compute_challenge_value, normalize_domain, ChallengeError,
    ChallengeProvider, ChallengeResult,
};

/// A pending DNS-01 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns01Challenge {
    /// Domain this challenge is for (may be a wildcard)
    pub domain: String,
    /// ACME challenge token
    pub token: String,
    /// ACME key authorization (`token.thumbprint`)
    pub key_authorization: String,
}

impl Dns01Challenge {
    pub fn new(
        domain: impl Into<String>,
        token: impl Into<String>,
        key_authorization: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            token: token.into(),
            key_authorization: key_authorization.into(),
        }
    }

    /// The full record name (e.g., "_acme-challenge.example.com")
    pub fn record_name(&self) -> String {
        challenge_record_fqdn(&self.domain)
    }

    /// The value the TXT record must carry
    pub fn record_value(&self) -> String {
        compute_challenge_value(&self.key_authorization)
    }
}

/// DNS-01 challenge manager
///
/// Cycles for the same domain are serialized through a [`KeyedLock`]; a
/// wildcard and its base domain share one lock since they share one record
/// name.
#[derive(Debug, Clone)]
pub struct Dns01ChallengeManager {
    provider: Arc<dyn ChallengeProvider>,
    checker: PropagationChecker,
    locks: KeyedLock,
}

impl Dns01ChallengeManager {
    pub fn new(provider: Arc<dyn ChallengeProvider>, checker: PropagationChecker) -> Self {
        Self {
            provider,
            checker,
            locks: KeyedLock::new(),
        }
    }

    /// Share per-domain locks with other callers touching the same records
    pub fn with_locks(mut self, locks: KeyedLock) -> Self {
        self.locks = locks;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run a full challenge cycle
    ///
    /// `validate` is awaited once the record is visible. The record is
    /// cleaned up afterwards in every case; a clean-up failure is only
    /// returned when everything before it succeeded.
    pub async fn run<T, E, F, Fut>(
        &self,
        challenge: &Dns01Challenge,
        cancel: &CancellationToken,
        validate: F,
    ) -> Result<T, E>
    where
        E: From<ChallengeError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let lock_key = format!("dns01:{}", normalize_domain(&challenge.domain));
        let _guard = self.locks.acquire(&lock_key).await;

        let result = match self.present_and_wait(challenge, cancel).await {
            Ok(()) => validate().await,
            Err(e) => Err(E::from(e)),
        };

        let cleanup = self
            .provider
            .clean_up(
                &challenge.domain,
                &challenge.token,
                &challenge.key_authorization,
            )
            .await;

        match (result, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(E::from(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                warn!(
                    domain = %challenge.domain,
                    error = %cleanup_err,
                    "Failed to cleanup DNS-01 challenge record after failed challenge"
                );
                Err(e)
            }
        }
    }

    /// Present the record and wait until it resolves
    pub async fn present_and_wait(
        &self,
        challenge: &Dns01Challenge,
        cancel: &CancellationToken,
    ) -> ChallengeResult<()> {
        let record_name = challenge.record_name();
        let record_value = challenge.record_value();

        info!(
            domain = %challenge.domain,
            record = %record_name,
            provider = %self.provider.name(),
            "Creating DNS-01 challenge record"
        );

        self.provider
            .present(
                &challenge.domain,
                &challenge.token,
                &challenge.key_authorization,
            )
            .await?;

        let timing = self.provider.timing();
        let elapsed = self
            .checker
            .wait_for_propagation(
                &record_name,
                &record_value,
                timing.propagation_timeout,
                timing.polling_interval,
                cancel,
            )
            .await?;

        info!(
            domain = %challenge.domain,
            elapsed_ms = elapsed.as_millis() as u64,
            "DNS-01 challenge record propagated"
        );
        Ok(())
    }
}
