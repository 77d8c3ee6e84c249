//! LRU Module
//!
//! Least Recently Used tracking and the size-bounding decorator built on it.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tracing::debug;

use crate::cache::mapping::Mapping;
use crate::cache::ttl::Expiring;
use crate::cache::{Key, KeyEncoding};
use crate::error::{CacheError, Result};

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are stored in a VecDeque where:
/// - Front = Least recently used
/// - Back = Most recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Order of keys by access time
    order: VecDeque<Key>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to back).
    ///
    /// If key exists, removes it first then adds to back.
    pub fn touch(&mut self, key: &Key) {
        self.remove(key);
        self.order.push_back(key.clone());
    }

    // == Remove ==
    /// Removes a key from the tracker. Absent keys are ignored.
    pub fn remove(&mut self, key: &Key) {
        self.order.retain(|k| k != key);
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&Key> {
        self.order.front()
    }

    /// Keeps only keys for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&Key) -> bool) {
        self.order.retain(keep);
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

// == LRU Decorator ==
/// Keeps a wrapped mapping at or below `max_size` entries by discarding the
/// least recently used ones.
///
/// The recency order is not persisted. At construction it is seeded from
/// the keys the wrapped mapping already holds, in listing order.
#[derive(Debug)]
pub struct Lru<M> {
    inner: M,
    max_size: usize,
    tracker: LruTracker,
    evictions: u64,
}

impl<M: Mapping> Lru<M> {
    // == Constructor ==
    /// Wraps `inner`, evicting immediately if it already holds more than
    /// `max_size` entries.
    pub fn new(inner: M, max_size: usize) -> Result<Self> {
        validate_max_size(max_size)?;
        let mut lru = Self {
            inner,
            max_size,
            tracker: LruTracker::new(),
            evictions: 0,
        };
        for key in lru.inner.keys()? {
            lru.tracker.touch(&key);
        }
        lru.evict_overflow()?;
        Ok(lru)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Changes the bound. Shrinking evicts right away.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<()> {
        validate_max_size(max_size)?;
        self.max_size = max_size;
        self.evict_overflow()
    }

    /// Number of entries discarded to stay within `max_size`.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Tracked keys from least to most recently used.
    pub fn recency(&self) -> impl Iterator<Item = &Key> {
        self.tracker.iter()
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut M {
        &mut self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }

    // == Eviction ==
    /// Deletes least recently used keys until the wrapped mapping fits.
    ///
    /// Tracked keys that already vanished underneath (expired, deleted
    /// directly on the inner mapping) are dropped without counting as
    /// evictions.
    fn evict_overflow(&mut self) -> Result<()> {
        while self.inner.len()? > self.max_size {
            let Some(victim) = self.tracker.peek_oldest().cloned() else {
                break;
            };
            match self.inner.delete(&victim) {
                Ok(()) => {
                    self.evictions += 1;
                    debug!(key = %victim, max_size = self.max_size, "Evicted least recently used key");
                }
                Err(CacheError::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            self.tracker.remove(&victim);
        }
        Ok(())
    }
}

fn validate_max_size(max_size: usize) -> Result<()> {
    if max_size == 0 {
        return Err(CacheError::Config(
            "max_size must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

impl<M: Mapping> Mapping for Lru<M> {
    type Value = M::Value;

    fn get(&mut self, key: &Key) -> Result<M::Value> {
        match self.inner.get(key) {
            Ok(value) => {
                self.tracker.touch(key);
                Ok(value)
            }
            Err(CacheError::KeyNotFound(k)) => {
                self.tracker.remove(key);
                Err(CacheError::KeyNotFound(k))
            }
            Err(e) => Err(e),
        }
    }

    fn set(&mut self, key: Key, value: M::Value) -> Result<()> {
        self.inner.set(key.clone(), value)?;
        self.tracker.touch(&key);
        self.evict_overflow()
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        let result = self.inner.delete(key);
        if matches!(result, Ok(()) | Err(CacheError::KeyNotFound(_))) {
            self.tracker.remove(key);
        }
        result
    }

    fn keys(&mut self) -> Result<Vec<Key>> {
        self.inner.keys()
    }

    fn len(&mut self) -> Result<usize> {
        self.inner.len()
    }

    fn contains(&mut self, key: &Key) -> Result<bool> {
        self.inner.contains(key)
    }

    fn read_reserved(&mut self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.inner.read_reserved(key)
    }

    fn write_reserved(&mut self, key: &Key, bytes: Vec<u8>) -> Result<()> {
        self.inner.write_reserved(key, bytes)
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn key_encoding(&self) -> KeyEncoding {
        self.inner.key_encoding()
    }

    fn sync(&mut self) -> Result<()> {
        self.inner.sync()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

impl<M: Expiring> Expiring for Lru<M> {
    fn set_with_timeout(
        &mut self,
        key: Key,
        value: M::Value,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.inner.set_with_timeout(key.clone(), value, timeout)?;
        self.tracker.touch(&key);
        self.evict_overflow()
    }

    fn default_timeout(&self) -> Duration {
        self.inner.default_timeout()
    }

    fn set_default_timeout(&mut self, timeout: Duration) {
        self.inner.set_default_timeout(timeout);
    }

    fn time_to_live(&mut self, key: &Key) -> Result<Option<Duration>> {
        self.inner.time_to_live(key)
    }

    fn sweep(&mut self) -> Result<usize> {
        let removed = self.inner.sweep()?;
        if removed > 0 {
            let live: HashSet<Key> = self.inner.keys()?.into_iter().collect();
            self.tracker.retain(|key| live.contains(key));
        }
        Ok(removed)
    }

    fn expirations(&self) -> u64 {
        self.inner.expirations()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{BackingStore, MemoryStore};
    use crate::cache::codec::RawBytes;
    use crate::cache::file_cache::FileCache;
    use crate::cache::mapping::MemoryMap;

    fn key(k: &str) -> Key {
        Key::from(k)
    }

    fn order(lru: &Lru<MemoryMap<u32>>) -> Vec<Key> {
        lru.recency().cloned().collect()
    }

    #[test]
    fn test_lru_tracker_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.peek_oldest(), None);
    }

    #[test]
    fn test_lru_tracker_touch_existing_key() {
        let mut lru = LruTracker::new();

        lru.touch(&key("key1"));
        lru.touch(&key("key2"));
        lru.touch(&key("key3"));

        // Touch key1 again - should move to back
        lru.touch(&key("key1"));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&key("key2")));
    }

    #[test]
    fn test_lru_tracker_remove_nonexistent_key() {
        let mut lru = LruTracker::new();

        lru.touch(&key("key1"));
        lru.touch(&key("key2"));

        lru.remove(&key("nonexistent"));

        assert_eq!(lru.len(), 2);
        assert!(lru.contains(&key("key1")));
        assert!(lru.contains(&key("key2")));
    }

    #[test]
    fn test_lru_tracker_touch_same_key_multiple_times() {
        let mut lru = LruTracker::new();

        lru.touch(&key("key1"));
        lru.touch(&key("key1"));
        lru.touch(&key("key1"));

        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_recency_order_follows_touches() {
        let mut lru = Lru::new(MemoryMap::new(), 10).unwrap();
        lru.set(key("a"), 1).unwrap();
        lru.set(key("b"), 2).unwrap();
        lru.set(key("c"), 3).unwrap();
        assert_eq!(order(&lru), vec![key("a"), key("b"), key("c")]);

        lru.get(&key("b")).unwrap();
        assert_eq!(order(&lru), vec![key("a"), key("c"), key("b")]);

        lru.get(&key("a")).unwrap();
        assert_eq!(order(&lru), vec![key("c"), key("b"), key("a")]);

        lru.set(key("d"), 4).unwrap();
        assert_eq!(order(&lru), vec![key("c"), key("b"), key("a"), key("d")]);
    }

    #[test]
    fn test_eviction_drops_least_recent() {
        let mut lru = Lru::new(MemoryMap::new(), 3).unwrap();
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            lru.set(key(k), i as u32).unwrap();
        }

        assert_eq!(lru.keys().unwrap(), vec![key("b"), key("c"), key("d")]);
        assert_eq!(lru.evictions(), 1);

        lru.get(&key("b")).unwrap();
        lru.set(key("e"), 5).unwrap();

        assert!(lru.contains(&key("b")).unwrap());
        assert!(!lru.contains(&key("c")).unwrap());
        assert_eq!(lru.len().unwrap(), 3);
    }

    #[test]
    fn test_construction_seeds_and_trims() {
        let map: MemoryMap<u32> = [("a", 1), ("b", 2), ("c", 3), ("d", 4)]
            .into_iter()
            .collect();
        let mut lru = Lru::new(map, 3).unwrap();

        assert_eq!(lru.len().unwrap(), 3);
        assert_eq!(order(&lru), vec![key("b"), key("c"), key("d")]);
    }

    #[test]
    fn test_delete_keeps_queue_in_step() {
        let mut lru = Lru::new(MemoryMap::new(), 5).unwrap();
        lru.set(key("a"), 1).unwrap();
        assert_eq!(lru.len().unwrap(), lru.recency().count());

        lru.delete(&key("a")).unwrap();
        assert_eq!(lru.len().unwrap(), lru.recency().count());

        assert!(matches!(
            lru.delete(&key("a")),
            Err(CacheError::KeyNotFound(_))
        ));
        assert_eq!(lru.recency().count(), 0);
    }

    #[test]
    fn test_refused_delete_keeps_queue() {
        let mut store = MemoryStore::new();
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        let cache = FileCache::with_store(store, "r".parse().unwrap(), RawBytes).unwrap();
        let mut lru = Lru::new(cache, 5).unwrap();

        assert!(matches!(lru.delete(&key("a")), Err(CacheError::ReadOnly)));
        assert_eq!(lru.recency().cloned().collect::<Vec<_>>(), vec![key("a"), key("b")]);
    }

    #[test]
    fn test_shrinking_max_size_evicts() {
        let mut lru = Lru::new(MemoryMap::new(), 5).unwrap();
        lru.update(vec![(key("a"), 1), (key("b"), 2), (key("c"), 3)])
            .unwrap();

        lru.set_max_size(1).unwrap();
        assert_eq!(lru.keys().unwrap(), vec![key("c")]);
        assert_eq!(lru.max_size(), 1);
    }

    #[test]
    fn test_zero_max_size_rejected() {
        assert!(matches!(
            Lru::new(MemoryMap::<u32>::new(), 0),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    fn test_clear_empties_queue() {
        let mut lru = Lru::new(MemoryMap::new(), 5).unwrap();
        lru.update(vec![(key("a"), 1), (key("b"), 2)]).unwrap();

        lru.clear().unwrap();
        assert_eq!(lru.len().unwrap(), 0);
        assert_eq!(lru.recency().count(), 0);
    }
}
