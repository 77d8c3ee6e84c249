//! Mapping Module
//!
//! The dictionary-like interface shared by the persistent cache, the plain
//! in-memory map, and the LRU/TTL decorators.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::cache::{Key, KeyEncoding};
use crate::error::{CacheError, Result};

// == Mapping ==
/// A mutable key/value container.
///
/// Decorators implement this by intercepting some operations and delegating
/// the rest to the container they wrap. Every method takes `&mut self`
/// because reads may have side effects (recency updates, lazy expiration).
pub trait Mapping {
    type Value;

    /// Fails with `KeyNotFound` if the key is absent.
    fn get(&mut self, key: &Key) -> Result<Self::Value>;

    fn set(&mut self, key: Key, value: Self::Value) -> Result<()>;

    /// Fails with `KeyNotFound` if the key is absent.
    fn delete(&mut self, key: &Key) -> Result<()>;

    /// All visible keys.
    fn keys(&mut self) -> Result<Vec<Key>>;

    fn len(&mut self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    fn contains(&mut self, key: &Key) -> Result<bool> {
        Ok(self.keys()?.contains(key))
    }

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads a raw slot that lives alongside the data. Used by decorators
    /// to persist their own bookkeeping.
    fn read_reserved(&mut self, key: &Key) -> Result<Option<Vec<u8>>>;

    /// Writes a raw slot, bypassing any write buffer and value codec.
    fn write_reserved(&mut self, key: &Key, bytes: Vec<u8>) -> Result<()>;

    fn is_read_only(&self) -> bool {
        false
    }

    /// Encoding applied to text keys.
    fn key_encoding(&self) -> KeyEncoding {
        KeyEncoding::default()
    }

    /// Turns a text key into key bytes with this container's encoding.
    fn text_key(&self, text: &str) -> Result<Key> {
        self.key_encoding().encode(text)
    }

    /// Visible keys decoded back to text.
    fn text_keys(&mut self) -> Result<Vec<String>> {
        let encoding = self.key_encoding();
        self.keys()?.iter().map(|key| encoding.decode(key)).collect()
    }

    /// Flushes pending writes to durable storage.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Syncs, then releases the container.
    fn close(&mut self) -> Result<()> {
        self.sync()
    }

    // == Dictionary Helpers ==
    /// Returns `default` instead of failing when the key is absent.
    fn get_or(&mut self, key: &Key, default: Self::Value) -> Result<Self::Value> {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(CacheError::KeyNotFound(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Returns the stored value, storing `default` first if absent.
    fn set_default(&mut self, key: Key, default: Self::Value) -> Result<Self::Value>
    where
        Self::Value: Clone,
    {
        match self.get(&key) {
            Ok(value) => Ok(value),
            Err(CacheError::KeyNotFound(_)) => {
                self.set(key, default.clone())?;
                Ok(default)
            }
            Err(e) => Err(e),
        }
    }

    fn update<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (Key, Self::Value)>,
        Self: Sized,
    {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Removes a key and returns its value.
    fn pop(&mut self, key: &Key) -> Result<Self::Value> {
        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }

    /// Removes and returns an arbitrary entry, or `None` when empty.
    fn pop_item(&mut self) -> Result<Option<(Key, Self::Value)>> {
        let Some(key) = self.keys()?.into_iter().next() else {
            return Ok(None);
        };
        let value = self.pop(&key)?;
        Ok(Some((key, value)))
    }

    /// Deletes every visible key through `delete`, so decorators see each
    /// removal.
    fn clear(&mut self) -> Result<()> {
        for key in self.keys()? {
            match self.delete(&key) {
                Ok(()) | Err(CacheError::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn items(&mut self) -> Result<Vec<(Key, Self::Value)>> {
        let mut items = Vec::new();
        for key in self.keys()? {
            match self.get(&key) {
                Ok(value) => items.push((key, value)),
                Err(CacheError::KeyNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }

    fn values(&mut self) -> Result<Vec<Self::Value>> {
        Ok(self.items()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Textual representation of the visible entries.
    fn render(&mut self) -> Result<String>
    where
        Self::Value: fmt::Debug,
    {
        let entries = self
            .items()?
            .into_iter()
            .map(|(key, value)| format!("{}: {:?}", key, value))
            .collect::<Vec<_>>();
        Ok(format!("{{{}}}", entries.join(", ")))
    }
}

// == Scoped Acquisition ==
/// Runs `f` against `map` and closes the map on every exit path.
///
/// The closure's error wins over a close error; a close error after a
/// successful closure is returned.
pub fn scoped<M, R, F>(mut map: M, f: F) -> Result<R>
where
    M: Mapping,
    F: FnOnce(&mut M) -> Result<R>,
{
    let outcome = f(&mut map);
    let closed = map.close();
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Close failed after an earlier error");
            Err(e)
        }
    }
}

// == Memory Map ==
/// A plain in-memory mapping with no persistence.
#[derive(Debug, Clone)]
pub struct MemoryMap<V> {
    entries: BTreeMap<Key, V>,
    reserved: BTreeMap<Key, Vec<u8>>,
}

impl<V> MemoryMap<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            reserved: BTreeMap::new(),
        }
    }
}

impl<V> Default for MemoryMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<Key>, V> FromIterator<(K, V)> for MemoryMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            reserved: BTreeMap::new(),
        }
    }
}

impl<V: Clone> Mapping for MemoryMap<V> {
    type Value = V;

    fn get(&mut self, key: &Key) -> Result<V> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::KeyNotFound(key.clone()))
    }

    fn set(&mut self, key: Key, value: V) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| CacheError::KeyNotFound(key.clone()))
    }

    fn keys(&mut self) -> Result<Vec<Key>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn contains(&mut self, key: &Key) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn read_reserved(&mut self, key: &Key) -> Result<Option<Vec<u8>>> {
        Ok(self.reserved.get(key).cloned())
    }

    fn write_reserved(&mut self, key: &Key, bytes: Vec<u8>) -> Result<()> {
        self.reserved.insert(key.clone(), bytes);
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Key {
        Key::from(k)
    }

    #[test]
    fn test_basic_access() {
        let mut map = MemoryMap::new();
        map.set(key("a"), 1).unwrap();

        assert!(map.contains(&key("a")).unwrap());
        assert_eq!(map.get(&key("a")).unwrap(), 1);
        assert_eq!(map.len().unwrap(), 1);

        map.delete(&key("a")).unwrap();
        assert!(!map.contains(&key("a")).unwrap());
        assert!(matches!(map.get(&key("a")), Err(CacheError::KeyNotFound(_))));
        assert_eq!(map.len().unwrap(), 0);
    }

    #[test]
    fn test_dictionary_helpers() {
        let mut map: MemoryMap<&str> = MemoryMap::new();

        assert_eq!(map.get_or(&key("a"), "blah").unwrap(), "blah");
        assert_eq!(map.set_default(key("a"), "blah").unwrap(), "blah");
        map.update(vec![(key("b"), "2"), (key("c"), "3"), (key("d"), "4")])
            .unwrap();
        assert_eq!(map.get_or(&key("b"), "x").unwrap(), "2");
        assert_eq!(map.len().unwrap(), 4);

        assert_eq!(map.pop(&key("a")).unwrap(), "blah");
        assert!(matches!(map.pop(&key("a")), Err(CacheError::KeyNotFound(_))));
        assert!(map.pop_item().unwrap().is_some());
        assert_eq!(map.len().unwrap(), 2);

        map.clear().unwrap();
        assert!(map.is_empty().unwrap());
        assert!(map.pop_item().unwrap().is_none());
    }

    #[test]
    fn test_items_values_render() {
        let mut map: MemoryMap<u32> = [("a", 1), ("b", 2)].into_iter().collect();

        assert_eq!(map.items().unwrap(), vec![(key("a"), 1), (key("b"), 2)]);
        assert_eq!(map.values().unwrap(), vec![1, 2]);
        assert_eq!(map.render().unwrap(), "{'a': 1, 'b': 2}");
    }

    #[test]
    fn test_reserved_slot_is_separate() {
        let mut map: MemoryMap<u32> = MemoryMap::new();
        map.write_reserved(&key("meta"), b"{}".to_vec()).unwrap();

        assert_eq!(map.read_reserved(&key("meta")).unwrap(), Some(b"{}".to_vec()));
        assert!(map.keys().unwrap().is_empty());
        assert_eq!(map.read_reserved(&key("other")).unwrap(), None);
    }

    #[test]
    fn test_scoped_returns_closure_value() {
        let map: MemoryMap<u32> = MemoryMap::new();
        let len = scoped(map, |m| {
            m.set(key("a"), 1)?;
            m.len()
        })
        .unwrap();
        assert_eq!(len, 1);
    }

    #[test]
    fn test_scoped_propagates_closure_error() {
        let map: MemoryMap<u32> = MemoryMap::new();
        let result: Result<u32> = scoped(map, |m| m.get(&key("missing")));
        assert!(matches!(result, Err(CacheError::KeyNotFound(_))));
    }
}
