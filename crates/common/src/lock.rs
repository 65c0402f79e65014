//! Per-resource serialization.
//!
//! Two mutating calls against the same remote resource (the same challenge
//! domain, the same deployment target) must not overlap. [`KeyedLock`]
//! hands out one async mutex per resource key; unrelated keys never block
//! each other.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Async mutex keyed by resource identity
#[derive(Debug, Default, Clone)]
pub struct KeyedLock {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held while the caller owns the resource. Dropping it releases the key.
///
/// The last holder of a key also removes its slot, so the map only tracks
/// keys that are held or waited on.
pub struct KeyedGuard {
    key: String,
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // One reference in the map, one in our own mutex guard
        self.slots
            .remove_if(self.key.as_str(), |_, slot| Arc::strong_count(slot) == 2);
    }
}

impl std::fmt::Debug for KeyedGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedGuard").field("key", &self.key).finish()
    }
}

impl KeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder owns `key`, then take it
    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        trace!(key = %key, "Waiting for resource lock");
        let guard = slot.lock_owned().await;

        KeyedGuard {
            key: key.to_string(),
            slots: self.slots.clone(),
            _guard: guard,
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
