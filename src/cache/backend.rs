//! Backing Store Module
//!
//! The byte-oriented persistence contract behind [`FileCache`](super::FileCache),
//! plus an ordered in-memory implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::Key;
use crate::error::{CacheError, Result};

// == Backing Store ==
/// Maps byte-string keys to byte-string values.
///
/// Implementations must make `set` atomic: a reader never observes a
/// partially written value.
pub trait BackingStore {
    /// Reads a value. Fails with `KeyNotFound` if absent.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Writes a value, replacing any previous one.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a value. Fails with `KeyNotFound` if absent.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Lists stored keys. A store that cannot be listed reports no keys.
    fn keys(&self) -> Vec<Vec<u8>>;

    fn exists(&self, key: &[u8]) -> bool;

    /// Where the store lives, for error messages.
    fn location(&self) -> &Path;

    /// Whether the underlying location currently exists.
    fn is_present(&self) -> bool;

    /// Creates the underlying location. Idempotent.
    fn create(&mut self) -> Result<()>;

    /// Removes the underlying location and everything in it.
    fn destroy(&mut self) -> Result<()>;
}

// == Memory Store ==
/// An ordered in-memory byte store.
///
/// Stands in for an externally supplied ordered byte-store and keeps tests
/// off the filesystem.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: PathBuf,
    data: Option<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates a store whose location already exists.
    pub fn new() -> Self {
        Self {
            name: PathBuf::from(":memory:"),
            data: Some(BTreeMap::new()),
        }
    }

    /// Creates a store whose location does not exist yet.
    pub fn absent() -> Self {
        Self {
            name: PathBuf::from(":memory:"),
            data: None,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_mut(&mut self) -> Result<&mut BTreeMap<Vec<u8>, Vec<u8>>> {
        let name = self.name.clone();
        self.data
            .as_mut()
            .ok_or(CacheError::DirectoryNotFound(name))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key).cloned())
            .ok_or_else(|| CacheError::KeyNotFound(Key::from(key)))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data_mut()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        match self.data.as_mut().and_then(|data| data.remove(key)) {
            Some(_) => Ok(()),
            None => Err(CacheError::KeyNotFound(Key::from(key))),
        }
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        self.data
            .as_ref()
            .map(|data| data.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn exists(&self, key: &[u8]) -> bool {
        self.data.as_ref().is_some_and(|data| data.contains_key(key))
    }

    fn location(&self) -> &Path {
        &self.name
    }

    fn is_present(&self) -> bool {
        self.data.is_some()
    }

    fn create(&mut self) -> Result<()> {
        self.data.get_or_insert_with(BTreeMap::new);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.data = None;
        Ok(())
    }
}
