//! Shared tag map
//!
//! A free-form key-value store shared by the scheduler, producers and sinks.
//! Handles are cheap to clone and every operation takes the lock internally,
//! so callers never see the synchronization.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe shared tag map
#[derive(Debug, Clone, Default)]
pub struct Tags {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl Tags {
    /// Creates an empty tag map
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// Stores `value` under `key`, returning the previous value
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically reads and replaces the value under `key`
    ///
    /// The closure runs under the write lock, so read-modify-write sequences
    /// (counters, appends) cannot interleave with other writers.
    pub fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(map.get(key));
        map.insert(key.to_string(), next.clone());
        next
    }

    /// Returns a point-in-time copy of the whole map
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges `entries` into the map, overwriting existing keys
    pub fn extend(&self, entries: HashMap<String, Value>) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.extend(entries);
    }
}
