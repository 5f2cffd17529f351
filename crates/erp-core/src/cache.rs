//! Time-to-live cache
//!
//! Entries remember when they were inserted and are treated as absent once
//! older than the cache TTL. Concurrent writers for the same key race and
//! the last write wins.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

/// Concurrent key/value cache with a single TTL
pub struct TtlCache<K, V> {
    entries: DashMap<K, CachedEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh value for `key`, dropping it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CachedEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every entry whose key matches `predicate`
    pub fn invalidate_where<F: Fn(&K) -> bool>(&self, predicate: F) {
        self.entries.retain(|key, _| !predicate(key));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_fresh_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("stats".to_string(), 42);
        assert_eq!(cache.get(&"stats".to_string()), Some(42));
    }

    #[test]
    fn test_expired_value_is_dropped() {
        let cache = TtlCache::new(Duration::from_millis(0));
        cache.insert(1, "value");
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", 1);
        cache.insert("k", 2);
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_where() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("dashboard:1".to_string(), 1);
        cache.insert("dashboard:2".to_string(), 2);
        cache.insert("other".to_string(), 3);

        cache.invalidate_where(|k| k.starts_with("dashboard:"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"other".to_string()), Some(3));
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new(Duration::from_millis(0));
        cache.insert(1, 1);
        cache.insert(2, 2);
        assert_eq!(cache.purge_expired(), 2);
    }
}
