//! End-to-end DNS-01 challenge cycles against an in-memory zone
//!
//! Present, wait for propagation, validate and clean up, with a resolver
//! that reads the same zone the record client writes.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use certkeeper_common::{Classify, ErrorKind, KeyedLock};
use certkeeper_config::TimingConfig;
use certkeeper_core::challenge::{
    ChallengeError, ChallengeProvider, Dns01Challenge, Dns01ChallengeManager, Dns01Provider,
    PropagationChecker,
};

use common::{FakeDns, FakeDnsClient};

const RECORD: &str = "_acme-challenge.example.com";
const TOKEN: &str = "token-1";
const KEY_AUTH: &str = "token-1.thumbprint";

fn fast_timing() -> TimingConfig {
    TimingConfig {
        propagation_timeout_seconds: Some(10),
        polling_interval_seconds: Some(2),
        ..TimingConfig::default()
    }
}

fn setup(dns: &FakeDns, timing: TimingConfig) -> (Arc<Dns01Provider<FakeDnsClient>>, Dns01ChallengeManager) {
    let provider = Arc::new(Dns01Provider::new(dns.client(), timing.resolve()));
    let manager = Dns01ChallengeManager::new(provider.clone(), PropagationChecker::new(dns.resolver()));
    (provider, manager)
}

#[derive(Debug)]
enum IssueError {
    Challenge(ChallengeError),
    Rejected(String),
}

impl From<ChallengeError> for IssueError {
    fn from(err: ChallengeError) -> Self {
        Self::Challenge(err)
    }
}

#[tokio::test(start_paused = true)]
async fn test_example_com_end_to_end() {
    let dns = FakeDns::new().with_hidden_lookups(2);
    let (provider, manager) = setup(&dns, TimingConfig::default());
    let challenge = Dns01Challenge::new("example.com", TOKEN, KEY_AUTH);
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let seen = manager
        .run(&challenge, &cancel, || async {
            Ok::<_, ChallengeError>(dns.values(RECORD))
        })
        .await
        .unwrap();

    // Visible on the third lookup, two default polling intervals in
    assert_eq!(seen, vec![challenge.record_value()]);
    assert_eq!(dns.lookups(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(4));

    assert_eq!(dns.creates(), 1);
    assert_eq!(dns.deletes(), 1);
    assert!(dns.values(RECORD).is_empty());
    assert_eq!(provider.state("example.com", KEY_AUTH), None);

    // A second clean-up is a successful no-op
    provider.clean_up("example.com", TOKEN, KEY_AUTH).await.unwrap();
    assert_eq!(dns.deletes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_propagation_timeout_still_cleans_up() {
    let dns = FakeDns::new().with_hidden_lookups(usize::MAX);
    let (_, manager) = setup(&dns, fast_timing());
    let challenge = Dns01Challenge::new("example.com", TOKEN, KEY_AUTH);
    let validated = AtomicUsize::new(0);

    let started = Instant::now();
    let err = manager
        .run(&challenge, &CancellationToken::new(), || async {
            validated.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ChallengeError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PropagationTimeout);
    assert!(!err.kind().is_retryable());
    // Deadline of five polling intervals: lookups at 0, 2, 4, 6, 8 and 10s
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(dns.lookups(), 6);

    assert_eq!(validated.load(Ordering::SeqCst), 0);
    assert_eq!(dns.deletes(), 1);
    assert!(dns.values(RECORD).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_validation_still_cleans_up() {
    let dns = FakeDns::new();
    let (_, manager) = setup(&dns, fast_timing());
    let challenge = Dns01Challenge::new("example.com", TOKEN, KEY_AUTH);

    let err = manager
        .run(&challenge, &CancellationToken::new(), || async {
            Err::<(), _>(IssueError::Rejected("authorization invalid".into()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, IssueError::Rejected(_)));
    assert_eq!(dns.deletes(), 1);
    assert!(dns.values(RECORD).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_propagation() {
    let dns = FakeDns::new().with_hidden_lookups(usize::MAX);
    let (_, manager) = setup(&dns, TimingConfig::default());
    let challenge = Dns01Challenge::new("example.com", TOKEN, KEY_AUTH);
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            cancel.cancel();
        })
    };

    let err = manager
        .run(&challenge, &cancel, || async { Ok::<_, IssueError>(()) })
        .await
        .unwrap_err();
    canceller.await.unwrap();

    match err {
        IssueError::Challenge(err) => assert_eq!(err.kind(), ErrorKind::Cancelled),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(dns.deletes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_domain_cycles_are_serialized() {
    let dns = FakeDns::new();
    let (_, manager) = setup(&dns, fast_timing());
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for (domain, key_auth) in [("example.com", "a.thumb"), ("*.example.com", "b.thumb")] {
        let manager = manager.clone();
        let active = active.clone();
        let max_active = max_active.clone();
        handles.push(tokio::spawn(async move {
            let challenge = Dns01Challenge::new(domain, "token", key_auth);
            manager
                .run(&challenge, &CancellationToken::new(), || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ChallengeError>(())
                })
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(dns.creates(), 2);
    assert_eq!(dns.deletes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_many_cycles_leave_no_state_behind() {
    let dns = FakeDns::new();
    let (provider, manager) = setup(&dns, fast_timing());
    let locks = KeyedLock::new();
    let manager = manager.with_locks(locks.clone());

    for i in 0..20 {
        let domain = format!("d{}.example.com", i);
        let challenge = Dns01Challenge::new(&domain, TOKEN, KEY_AUTH);
        manager
            .run(&challenge, &CancellationToken::new(), || async {
                Ok::<_, ChallengeError>(())
            })
            .await
            .unwrap();

        assert_eq!(provider.state(&domain, KEY_AUTH), None);
    }

    assert_eq!(dns.creates(), 20);
    assert_eq!(dns.deletes(), 20);
    assert!(locks.is_empty());
}
