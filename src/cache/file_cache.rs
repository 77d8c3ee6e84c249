//! File Cache Module
//!
//! The persistent, dictionary-like cache: key encoding, a write buffer,
//! explicit sync, and an open/deleted/closed lifecycle over a
//! [`BackingStore`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cache::backend::BackingStore;
use crate::cache::codec::{Codec, RawBytes};
use crate::cache::directory::DirectoryStore;
use crate::cache::flags::{Existence, OpenFlags};
use crate::cache::mapping::Mapping;
use crate::cache::{Key, KeyEncoding};
use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    /// Storage removed by `delete_store`; only `create` revives it.
    Deleted,
    Closed,
}

// == File Cache ==
/// A persistent cache that is dictionary-like and has a write buffer.
///
/// By default writes are buffered in memory until [`FileCache::sync`] is
/// called. Opening with a second flag character `s` writes every mutation
/// through immediately instead.
///
/// Dropping a `FileCache` does not sync it. Call `close` (or use
/// [`scoped`](super::scoped)) so buffered writes reach the store.
pub struct FileCache<C: Codec = RawBytes, S: BackingStore = DirectoryStore> {
    store: S,
    codec: C,
    flags: OpenFlags,
    key_encoding: KeyEncoding,
    /// Pending writes. `None` in immediate mode, after `delete_store`, and
    /// after `close`.
    buffer: Option<HashMap<Key, C::Value>>,
    state: Lifecycle,
}

impl<C: Codec, S: BackingStore + fmt::Debug> fmt::Debug for FileCache<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("store", &self.store)
            .field("flags", &self.flags)
            .field("key_encoding", &self.key_encoding.name())
            .field("pending", &self.pending())
            .field("state", &self.state)
            .finish()
    }
}

impl FileCache {
    /// Opens a raw-bytes cache in `dir` with the given flag string.
    pub fn open(dir: impl Into<PathBuf>, flag: &str) -> Result<Self> {
        Self::open_with_codec(dir, flag, RawBytes)
    }
}

impl<C: Codec> FileCache<C, DirectoryStore> {
    /// Opens a cache in `dir` whose values go through `codec`.
    pub fn open_with_codec(dir: impl Into<PathBuf>, flag: &str, codec: C) -> Result<Self> {
        let flags: OpenFlags = flag.parse()?;
        Self::with_store(DirectoryStore::new(dir), flags, codec)
    }

    /// The cache directory.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// The on-disk file that holds (or will hold) a key.
    pub fn file_path(&self, key: &Key) -> PathBuf {
        self.store.file_path(key.as_bytes())
    }
}

impl<C: Codec, S: BackingStore> FileCache<C, S> {
    // == Constructor ==
    /// Opens a cache over an arbitrary backing store.
    ///
    /// Fails with `DirectoryNotFound` when the flags require an existing
    /// location that is absent.
    pub fn with_store(mut store: S, flags: OpenFlags, codec: C) -> Result<Self> {
        let present = store.is_present();
        match flags.existence {
            Existence::ReadOnly | Existence::ReadWrite if !present => {
                return Err(CacheError::DirectoryNotFound(store.location().to_path_buf()));
            }
            Existence::Truncate if present => {
                store.destroy()?;
                store.create()?;
            }
            Existence::Create | Existence::Truncate if !present => store.create()?,
            _ => {}
        }

        info!(location = %store.location().display(), flag = %flags, "Opened file cache");

        Ok(Self {
            buffer: (!flags.immediate).then(HashMap::new),
            store,
            codec,
            flags,
            key_encoding: KeyEncoding::default(),
            state: Lifecycle::Open,
        })
    }

    /// Sets the encoding used for text keys (UTF-8 by default).
    pub fn with_key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    // == Accessors ==
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.state == Lifecycle::Closed
    }

    /// Whether `key` has a pending, unsynced write.
    pub fn is_buffered(&self, key: &Key) -> bool {
        self.buffer.as_ref().is_some_and(|b| b.contains_key(key))
    }

    /// Number of pending, unsynced writes.
    pub fn pending(&self) -> usize {
        self.buffer.as_ref().map_or(0, HashMap::len)
    }

    // == Lifecycle ==
    /// Creates the write buffer and the storage location.
    pub fn create(&mut self) -> Result<()> {
        if self.state == Lifecycle::Closed {
            return Err(CacheError::Closed);
        }
        if !self.flags.immediate && self.buffer.is_none() {
            self.buffer = Some(HashMap::new());
        }
        self.store.create()?;
        if self.state == Lifecycle::Deleted {
            info!(location = %self.store.location().display(), "Recreated file cache storage");
        }
        self.state = Lifecycle::Open;
        Ok(())
    }

    /// Drops the write buffer without syncing and removes the storage
    /// location with everything in it.
    ///
    /// Removing storage is a mutation, so a read-only cache refuses it with
    /// `ReadOnly` and leaves the directory untouched.
    pub fn delete_store(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.buffer = None;
        self.state = Lifecycle::Deleted;
        warn!(location = %self.store.location().display(), "Deleting file cache storage");
        self.store.destroy()
    }

    // == Guards ==
    fn ensure_open(&self) -> Result<()> {
        match self.state {
            Lifecycle::Open => Ok(()),
            Lifecycle::Deleted => Err(CacheError::Uninitialized),
            Lifecycle::Closed => Err(CacheError::Closed),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.flags.is_read_only() {
            Err(CacheError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn write_through(&mut self, key: &Key, value: &C::Value) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.store.set(key.as_bytes(), &bytes)
    }
}

impl<C: Codec, S: BackingStore> Mapping for FileCache<C, S> {
    type Value = C::Value;

    fn get(&mut self, key: &Key) -> Result<C::Value> {
        self.ensure_open()?;
        if let Some(value) = self.buffer.as_ref().and_then(|b| b.get(key)) {
            return Ok(value.clone());
        }
        let bytes = match self.store.get(key.as_bytes()) {
            Err(CacheError::KeyNotFound(_)) => return Err(CacheError::KeyNotFound(key.clone())),
            other => other?,
        };
        self.codec.decode(&bytes)
    }

    fn set(&mut self, key: Key, value: C::Value) -> Result<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer.insert(key, value);
                Ok(())
            }
            None => self.write_through(&key, &value),
        }
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        let was_buffered = self
            .buffer
            .as_mut()
            .is_some_and(|b| b.remove(key).is_some());
        match self.store.delete(key.as_bytes()) {
            Ok(()) => Ok(()),
            Err(CacheError::KeyNotFound(_)) if was_buffered => Ok(()),
            Err(CacheError::KeyNotFound(_)) => Err(CacheError::KeyNotFound(key.clone())),
            Err(e) => Err(e),
        }
    }

    fn keys(&mut self) -> Result<Vec<Key>> {
        self.ensure_open()?;
        let mut keys: BTreeSet<Key> = self.store.keys().into_iter().map(Key::from).collect();
        if let Some(buffer) = &self.buffer {
            keys.extend(buffer.keys().cloned());
        }
        Ok(keys.into_iter().collect())
    }

    fn contains(&mut self, key: &Key) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.is_buffered(key) || self.store.exists(key.as_bytes()))
    }

    fn read_reserved(&mut self, key: &Key) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        match self.store.get(key.as_bytes()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(CacheError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_reserved(&mut self, key: &Key, bytes: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.store.set(key.as_bytes(), &bytes)
    }

    fn is_read_only(&self) -> bool {
        self.flags.is_read_only()
    }

    fn key_encoding(&self) -> KeyEncoding {
        self.key_encoding
    }

    /// Writes every buffered entry to the store and empties the buffer.
    /// A no-op in immediate mode or when nothing is pending.
    fn sync(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(());
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let pending: Vec<Key> = buffer.keys().cloned().collect();
        let count = pending.len();
        for key in pending {
            // Entries leave the buffer only once written, so a failed write
            // keeps the rest pending.
            let Some(value) = buffer.get(&key) else {
                continue;
            };
            let bytes = self.codec.encode(value)?;
            self.store.set(key.as_bytes(), &bytes)?;
            buffer.remove(&key);
        }

        debug!(entries = count, "Synced write buffer");
        Ok(())
    }

    /// Syncs and moves to the terminal closed state.
    fn close(&mut self) -> Result<()> {
        match self.state {
            Lifecycle::Closed => return Err(CacheError::Closed),
            Lifecycle::Open => self.sync()?,
            Lifecycle::Deleted => {}
        }
        self.buffer = None;
        self.state = Lifecycle::Closed;
        info!(location = %self.store.location().display(), "Closed file cache");
        Ok(())
    }

    /// Removes all storage and the buffer, then reopens empty.
    fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
        if self.store.is_present() {
            self.store.destroy()?;
        }
        self.store.create()?;
        info!(location = %self.store.location().display(), "Cleared file cache");
        Ok(())
    }
}
