//! Generic registry for thread-safe storage of named components.
//!
//! Wraps the `Arc<RwLock<HashMap<String, Arc<T>>>>` pattern used by the
//! provider registries, where vendor names map to constructors.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use certkeeper_common::Registry;
//!
//! let registry: Registry<str> = Registry::new();
//! registry.insert("hetzner", Arc::from("Hetzner DNS"));
//!
//! assert_eq!(registry.get("hetzner").as_deref(), Some("Hetzner DNS"));
//! assert!(registry.get("route53").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A thread-safe registry for named components.
///
/// Reads are concurrent; writes are exclusive. `T` may be unsized so that
/// trait objects such as `dyn Fn(..)` factories can be stored directly.
#[derive(Debug)]
pub struct Registry<T: ?Sized> {
    items: Arc<RwLock<HashMap<String, Arc<T>>>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a component by name.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.items.read().get(id).cloned()
    }

    /// Check if a component exists.
    pub fn contains(&self, id: &str) -> bool {
        self.items.read().contains_key(id)
    }

    /// Insert a component, returning the previous value if any.
    pub fn insert(&self, id: impl Into<String>, item: Arc<T>) -> Option<Arc<T>> {
        self.items.write().insert(id.into(), item)
    }

    /// Remove a component by name.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.items.write().remove(id)
    }

    /// All registered names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}
