//! Generic TTL cache
//!
//! Every value fetched from the venue is cached under a key with a
//! kind-specific time-to-live, measured on the injected [`Clock`]. Failed
//! fetches are never cached.

use chrono::Duration;
use dashmap::DashMap;
use meridian_core::Timestamp;
use meridian_ports::Clock;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: Timestamp,
}

/// Keyed cache whose entries expire after a caller-supplied TTL
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Fresh value for `key`, if one was stored less than `ttl` ago
    pub fn get(&self, key: &K, ttl: Duration) -> Option<V> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if now - entry.fetched_at < ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let fetched_at = self.clock.now();
        self.entries.insert(key, CacheEntry { value, fetched_at });
    }

    /// Return the cached value or run `fetcher` and cache its success
    ///
    /// The map guard is released before `fetcher` is awaited, so concurrent
    /// callers for the same key may both fetch; the later write wins.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, ttl: Duration, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key, ttl) {
            return Ok(value);
        }
        let value = fetcher().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry whose key matches
    pub fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) {
        self.entries.retain(|key, _| !predicate(key));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
