//! DNS-01 challenge support
//!
//! This module provides:
//! - [`ChallengeProvider`]: present / clean up one challenge TXT record
//! - [`Dns01Provider`]: the provider for any vendor exposing a
//!   [`DnsRecordClient`]
//! - [`PropagationChecker`]: waits until the record resolves
//! - [`Dns01ChallengeManager`]: one serialized present / wait / validate /
//!   clean up cycle per domain
//! - [`ChallengeProviderRegistry`]: constructs providers by vendor name
//!
//! # Example
//!
//! ```ignore
//! let registry = ChallengeProviderRegistry::with_builtin();
//! let provider = registry.create(&ProviderConfig::new(
//!     "hetzner",
//!     json!({"apiToken": "env:HETZNER_DNS_TOKEN"}),
//! ))?;
//!
//! let manager = Dns01ChallengeManager::new(provider, PropagationChecker::with_public_resolvers());
//! manager
//!     .run(&challenge, &cancel, || async { acme.notify_ready(&challenge).await })
//!     .await?;
//! ```

pub mod dns01;
pub mod manager;
pub mod propagation;
pub mod provider;
pub mod providers;
pub mod registry;

pub use dns01::{ChallengeState, Dns01Provider, DnsClientError, DnsRecordClient, TxtRecord};
pub use manager::{Dns01Challenge, Dns01ChallengeManager};
pub use propagation::{HickoryTxtResolver, LookupError, PropagationChecker, TxtResolver};
pub use provider::{
    challenge_record_fqdn, compute_challenge_value, normalize_domain, ChallengeError,
    ChallengeProvider, ChallengeResult, FailureDetail, ACME_CHALLENGE_RECORD,
};
pub use providers::{CloudflareClient, HetznerClient, WebhookClient};
pub use registry::ChallengeProviderRegistry;
