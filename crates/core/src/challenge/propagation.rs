//! DNS propagation checking for DNS-01 challenges
//!
//! Polls TXT lookups until the expected value is visible. Vendor-agnostic:
//! lookups go through [`TxtResolver`], backed by hickory in production and
//! by fakes in tests.

use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::provider::{ChallengeError, ChallengeResult};

/// Shortest pause between two lookups
const MIN_POLLING_INTERVAL: Duration = Duration::from_millis(10);

/// A failed TXT lookup
#[derive(Debug, Error)]
pub enum LookupError {
    /// NXDOMAIN or an empty answer
    #[error("no TXT records found")]
    NotFound,

    /// Any other resolver failure
    #[error("DNS lookup failed: {0}")]
    Failed(String),
}

/// Resolves the TXT values of a name
#[async_trait]
pub trait TxtResolver: Send + Sync + Debug {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>, LookupError>;
}

/// Public resolvers queried by default
pub fn default_nameservers() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), // Google DNS
        IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), // Cloudflare DNS
        IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)), // Quad9
    ]
}

/// [`TxtResolver`] backed by hickory with caching disabled
#[derive(Debug)]
pub struct HickoryTxtResolver {
    resolver: TokioResolver,
}

impl HickoryTxtResolver {
    /// Query the given nameservers (empty = system defaults)
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let resolver_config = if nameservers.is_empty() {
            ResolverConfig::default()
        } else {
            let mut resolver_config = ResolverConfig::new();
            for ip in nameservers {
                resolver_config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(*ip, 53),
                    Protocol::Udp,
                ));
            }
            resolver_config
        };

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;
        opts.cache_size = 0; // Disable caching for propagation checks

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { resolver }
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>, LookupError> {
        match self.resolver.txt_lookup(fqdn).await {
            Ok(records) => Ok(records
                .iter()
                .map(|record| {
                    // TXT records can have multiple strings, join them
                    record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => {
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("no records found")
                    || err_str.contains("nxdomain")
                    || err_str.contains("record not found")
                {
                    Err(LookupError::NotFound)
                } else {
                    Err(LookupError::Failed(e.to_string()))
                }
            }
        }
    }
}

/// DNS propagation checker
#[derive(Debug, Clone)]
pub struct PropagationChecker {
    resolver: Arc<dyn TxtResolver>,
}

impl PropagationChecker {
    pub fn new(resolver: Arc<dyn TxtResolver>) -> Self {
        Self { resolver }
    }

    /// Checker querying the public resolvers from [`default_nameservers`]
    pub fn with_public_resolvers() -> Self {
        Self::new(Arc::new(HickoryTxtResolver::new(&default_nameservers())))
    }

    /// One lookup; any lookup failure counts as "not yet visible"
    pub async fn is_visible(&self, fqdn: &str, expected_value: &str) -> bool {
        match self.resolver.lookup_txt(fqdn).await {
            Ok(values) => {
                trace!(record = %fqdn, found = values.len(), "Checking TXT record");
                values.iter().any(|v| v == expected_value)
            }
            Err(LookupError::NotFound) => {
                trace!(record = %fqdn, "Record not yet propagated");
                false
            }
            Err(e) => {
                warn!(record = %fqdn, error = %e, "DNS lookup error");
                false
            }
        }
    }

    /// Wait until `expected_value` is among the TXT values of `fqdn`
    ///
    /// Looks up immediately, then every `interval` until `timeout` has
    /// elapsed. Returns the time it took. A lookup still pending at the
    /// deadline is abandoned. Cancellation aborts both a pending lookup and
    /// the pause between lookups.
    pub async fn wait_for_propagation(
        &self,
        fqdn: &str,
        expected_value: &str,
        timeout: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> ChallengeResult<Duration> {
        let interval = interval.max(MIN_POLLING_INTERVAL);
        let start = Instant::now();
        let deadline = start + timeout;
        let cancelled = || ChallengeError::Cancelled {
            record_name: fqdn.to_string(),
        };

        debug!(
            record = %fqdn,
            timeout_secs = timeout.as_secs(),
            interval_ms = interval.as_millis() as u64,
            "Waiting for DNS propagation"
        );

        loop {
            let visible = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                lookup = tokio::time::timeout_at(deadline, self.is_visible(fqdn, expected_value)) => {
                    lookup.unwrap_or_else(|_| {
                        warn!(record = %fqdn, "DNS lookup still pending at the deadline");
                        false
                    })
                }
            };

            if visible {
                let elapsed = start.elapsed();
                debug!(
                    record = %fqdn,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "DNS propagation confirmed"
                );
                return Ok(elapsed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChallengeError::PropagationTimeout {
                    record_name: fqdn.to_string(),
                    elapsed: now - start,
                });
            }

            let pause = interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
