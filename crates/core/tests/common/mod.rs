//! Shared test utilities for integration tests
//!
//! Certificate fixtures, an in-memory DNS zone that backs both a
//! [`DnsRecordClient`] and a [`TxtResolver`], and a counting deploy target.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rcgen::{CertificateParams, KeyPair};

use certkeeper_core::challenge::{
    DnsClientError, DnsRecordClient, LookupError, TxtRecord, TxtResolver,
};
use certkeeper_core::deploy::{CertificateMaterial, DeployError, DeployTarget, DeploymentResult};

/// Self-signed certificate PEM and its PKCS#8 key PEM
pub fn self_signed(names: &[&str]) -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

// ============================================================================
// Fake DNS
// ============================================================================

/// One zone shared by a record client and a resolver
///
/// The resolver answers `NotFound` for the first `hidden_lookups` queries of
/// a name, which stands in for propagation delay.
#[derive(Debug, Clone, Default)]
pub struct FakeDns {
    records: Arc<Mutex<BTreeMap<String, Vec<TxtRecord>>>>,
    next_id: Arc<AtomicUsize>,
    creates: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
    hidden_lookups: Arc<AtomicUsize>,
}

impl FakeDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_lookups(self, count: usize) -> Self {
        self.hidden_lookups.store(count, Ordering::SeqCst);
        self
    }

    pub fn client(&self) -> FakeDnsClient {
        FakeDnsClient { dns: self.clone() }
    }

    pub fn resolver(&self) -> Arc<FakeResolver> {
        Arc::new(FakeResolver { dns: self.clone() })
    }

    pub fn values(&self, fqdn: &str) -> Vec<String> {
        self.records
            .lock()
            .get(fqdn)
            .map(|records| records.iter().map(|r| r.value.clone()).collect())
            .unwrap_or_default()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct FakeDnsClient {
    dns: FakeDns,
}

#[async_trait]
impl DnsRecordClient for FakeDnsClient {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn find_txt_records(&self, fqdn: &str) -> Result<Vec<TxtRecord>, DnsClientError> {
        Ok(self
            .dns
            .records
            .lock()
            .get(fqdn)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_txt_record(
        &self,
        fqdn: &str,
        value: &str,
        _ttl: u32,
    ) -> Result<String, DnsClientError> {
        self.dns.creates.fetch_add(1, Ordering::SeqCst);
        let id = format!("rec-{}", self.dns.next_id.fetch_add(1, Ordering::SeqCst));
        self.dns
            .records
            .lock()
            .entry(fqdn.to_string())
            .or_default()
            .push(TxtRecord {
                id: id.clone(),
                fqdn: fqdn.to_string(),
                value: value.to_string(),
            });
        Ok(id)
    }

    async fn delete_txt_record(&self, fqdn: &str, record_id: &str) -> Result<(), DnsClientError> {
        self.dns.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(records) = self.dns.records.lock().get_mut(fqdn) {
            records.retain(|r| r.id != record_id);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeResolver {
    dns: FakeDns,
}

#[async_trait]
impl TxtResolver for FakeResolver {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>, LookupError> {
        let seen = self.dns.lookups.fetch_add(1, Ordering::SeqCst);
        if seen < self.dns.hidden_lookups.load(Ordering::SeqCst) {
            return Err(LookupError::NotFound);
        }

        let values = self.dns.values(fqdn);
        if values.is_empty() {
            Err(LookupError::NotFound)
        } else {
            Ok(values)
        }
    }
}

// ============================================================================
// Counting deploy target
// ============================================================================

/// Records every install call and succeeds
#[derive(Debug, Clone, Default)]
pub struct CountingTarget {
    installs: Arc<AtomicUsize>,
}

impl CountingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployTarget for CountingTarget {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn install(&self, material: &CertificateMaterial) -> Result<DeploymentResult, DeployError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(DeploymentResult::new(self.name()).with_metadata("fingerprint", material.fingerprint()))
    }
}
