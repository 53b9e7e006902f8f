//! Bounded cache with insertion-ordered (FIFO) eviction.

use std::collections::VecDeque;

/// Default number of entries kept per cache.
pub const DEFAULT_SIZE_LIMIT: usize = 20;

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries.
    pub size: usize,

    /// Maximum number of entries.
    pub limit: usize,
}

/// Key/value store that keeps the `limit` most recently *inserted* entries.
///
/// Entries live in a flat sequence in insertion order and lookups are a
/// linear scan. Caches stay at a few dozen entries and every hit saves a
/// network round trip, so the scan is never the bottleneck.
///
/// Lookups have no ordering side effect: this is FIFO, not LRU.
#[derive(Debug, Clone)]
pub struct BoundedOrderedCache<K, V> {
    entries: VecDeque<(K, V)>,
    limit: usize,
}

impl<K, V> BoundedOrderedCache<K, V>
where
    K: PartialEq,
    V: Clone,
{
    /// Creates an empty cache holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(DEFAULT_SIZE_LIMIT)),
            limit,
        }
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Inserts an entry as the newest one.
    ///
    /// At the limit, the oldest entry is evicted first. Re-adding an existing
    /// key replaces it, so keys stay unique. With a limit of zero nothing is
    /// stored.
    pub fn add(&mut self, key: K, value: V) {
        if self.limit == 0 {
            return;
        }
        self.remove(&key);
        if self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }

    /// Removes every entry stored under `key`.
    pub fn remove(&mut self, key: &K) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Sets a new limit and drops every entry.
    ///
    /// Existing entries are never trimmed to fit: re-limiting always starts
    /// from an empty cache.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.entries.clear();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            limit: self.limit,
        }
    }
}

impl<K, V> Default for BoundedOrderedCache<K, V>
where
    K: PartialEq,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_LIMIT)
    }
}
