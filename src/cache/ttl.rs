//! TTL Module
//!
//! Per-key expiration for any [`Mapping`], with the expiry index persisted
//! in a reserved slot of the wrapped mapping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::mapping::Mapping;
use crate::cache::{Key, KeyEncoding};
use crate::error::{CacheError, Result};

/// Name of the reserved slot holding the expiry index.
///
/// It lives in the same key space as application data (for a directory
/// store, as the file `hex(INDEX_KEY)`), so it is a fixed 40-character
/// digest that no application key is expected to equal. The TTL layer
/// refuses direct reads, writes and deletes of it and hides it from
/// listings.
pub const INDEX_KEY: &str = "f1dd04ff3d4d9adfabd43a3f9fda9b4b78302b21";

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Absolute expiry for a timeout; a zero timeout never expires.
fn deadline(timeout: Duration) -> Option<u64> {
    if timeout.is_zero() {
        None
    } else {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Some(current_timestamp_ms().saturating_add(millis))
    }
}

// == Expiring ==
/// Mappings whose entries can expire.
pub trait Expiring: Mapping {
    /// Stores a value that expires after `timeout`.
    ///
    /// `Some(Duration::ZERO)` never expires; `None` uses the default timeout.
    fn set_with_timeout(
        &mut self,
        key: Key,
        value: Self::Value,
        timeout: Option<Duration>,
    ) -> Result<()>;

    fn default_timeout(&self) -> Duration;

    fn set_default_timeout(&mut self, timeout: Duration);

    /// Remaining lifetime of a key, `None` if it never expires.
    ///
    /// Fails with `KeyNotFound` when the key is absent or expired.
    fn time_to_live(&mut self, key: &Key) -> Result<Option<Duration>>;

    /// Deletes every expired entry, returning how many were removed.
    fn sweep(&mut self) -> Result<usize>;

    /// Number of entries removed because they expired.
    fn expirations(&self) -> u64;
}

// == Expiry Index ==
/// Maps keys to absolute expiry times in Unix milliseconds. `None` never
/// expires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpiryIndex {
    entries: HashMap<Key, Option<u64>>,
}

/// On-disk form of the index, keyed by hex so arbitrary byte keys survive.
#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    expires: BTreeMap<String, Option<u64>>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded expiry for a key, `None` if the key is not indexed.
    pub fn expiry(&self, key: &Key) -> Option<Option<u64>> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: Key, expires_at: Option<u64>) {
        self.entries.insert(key, expires_at);
    }

    pub fn remove(&mut self, key: &Key) -> Option<Option<u64>> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the key has an expiry at or before `now`.
    pub fn is_expired(&self, key: &Key, now: u64) -> bool {
        matches!(self.expiry(key), Some(Some(at)) if now >= at)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let document = IndexDocument {
            expires: self
                .entries
                .iter()
                .map(|(key, at)| (key.to_hex(), *at))
                .collect(),
        };
        serde_json::to_vec(&document).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let document: IndexDocument = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::Deserialization(format!("expiry index: {}", e)))?;
        let mut entries = HashMap::with_capacity(document.expires.len());
        for (name, at) in document.expires {
            let key = Key::from_hex(&name)
                .map_err(|e| CacheError::Deserialization(format!("expiry index: {}", e)))?;
            entries.insert(key, at);
        }
        Ok(Self { entries })
    }
}

// == TTL Decorator ==
/// Adds per-key expiration to a wrapped mapping.
///
/// Expired entries are deleted lazily: any read, listing, length or
/// containment check that meets one removes it first and reports it absent.
/// The index is written to the wrapped mapping's reserved slot on `sync`
/// and `close`.
#[derive(Debug)]
pub struct Ttl<M> {
    inner: M,
    default_timeout: Duration,
    index: ExpiryIndex,
    index_key: Key,
    expirations: u64,
}

impl<M: Mapping> Ttl<M> {
    // == Constructor ==
    /// Wraps `inner`, loading its expiry index or creating an empty one.
    ///
    /// An existing index is reconciled with the stored keys (unindexed keys
    /// never expire, index entries without data are dropped) and every
    /// already-expired entry is removed.
    pub fn new(inner: M, default_timeout: Duration) -> Result<Self> {
        let index_key = Key::from(INDEX_KEY);
        let mut ttl = Self {
            inner,
            default_timeout,
            index: ExpiryIndex::new(),
            index_key,
            expirations: 0,
        };

        match ttl.inner.read_reserved(&ttl.index_key)? {
            Some(bytes) => {
                ttl.index = ExpiryIndex::from_bytes(&bytes)?;
                ttl.reconcile()?;
                let removed = ttl.sweep()?;
                debug!(indexed = ttl.index.len(), removed, "Loaded expiry index");
            }
            None => {
                ttl.reconcile()?;
                ttl.persist_index()?;
            }
        }

        Ok(ttl)
    }

    pub fn index(&self) -> &ExpiryIndex {
        &self.index
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

    fn is_reserved(&self, key: &Key) -> bool {
        *key == self.index_key
    }

    fn reject_reserved(&self, key: &Key) -> Result<()> {
        if self.is_reserved(key) {
            Err(CacheError::ReservedKey(format!(
                "cannot access protected key '{}'",
                INDEX_KEY
            )))
        } else {
            Ok(())
        }
    }

    /// Stored data keys, without the index slot.
    fn data_keys(&mut self) -> Result<Vec<Key>> {
        let index_key = self.index_key.clone();
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter(|key| *key != index_key)
            .collect())
    }

    fn reconcile(&mut self) -> Result<()> {
        let stored: HashSet<Key> = self.data_keys()?.into_iter().collect();
        self.index.entries.retain(|key, _| stored.contains(key));
        for key in stored {
            self.index.entries.entry(key).or_insert(None);
        }
        Ok(())
    }

    /// Deletes `key` if it has expired. Returns whether it had.
    ///
    /// Over a read-only mapping the entry is reported expired but left in
    /// place.
    fn expire_if_due(&mut self, key: &Key) -> Result<bool> {
        if !self.index.is_expired(key, current_timestamp_ms()) {
            return Ok(false);
        }
        if self.inner.is_read_only() {
            return Ok(true);
        }
        match self.inner.delete(key) {
            Ok(()) | Err(CacheError::KeyNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.index.remove(key);
        self.expirations += 1;
        debug!(key = %key, "Expired key removed");
        Ok(true)
    }

    fn persist_index(&mut self) -> Result<()> {
        if self.inner.is_read_only() {
            return Ok(());
        }
        let bytes = self.index.to_bytes()?;
        self.inner.write_reserved(&self.index_key, bytes)
    }
}

impl<M: Mapping> Mapping for Ttl<M> {
    type Value = M::Value;

    fn get(&mut self, key: &Key) -> Result<M::Value> {
        self.reject_reserved(key)?;
        if self.expire_if_due(key)? {
            return Err(CacheError::KeyNotFound(key.clone()));
        }
        self.inner.get(key)
    }

    /// Stores a value with the default timeout.
    fn set(&mut self, key: Key, value: M::Value) -> Result<()> {
        self.set_with_timeout(key, value, None)
    }

    /// The index entry goes only once the data is gone, so a refused delete
    /// leaves an expired key still expired.
    fn delete(&mut self, key: &Key) -> Result<()> {
        self.reject_reserved(key)?;
        let result = self.inner.delete(key);
        if matches!(result, Ok(()) | Err(CacheError::KeyNotFound(_))) {
            self.index.remove(key);
        }
        result
    }

    fn keys(&mut self) -> Result<Vec<Key>> {
        let mut live = Vec::new();
        for key in self.data_keys()? {
            if !self.expire_if_due(&key)? {
                live.push(key);
            }
        }
        Ok(live)
    }

    fn contains(&mut self, key: &Key) -> Result<bool> {
        if self.is_reserved(key) || self.expire_if_due(key)? {
            return Ok(false);
        }
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
        self.persist_index()?;
        self.inner.sync()
    }

    fn close(&mut self) -> Result<()> {
        self.persist_index()?;
        self.inner.close()
    }
}

impl<M: Mapping> Expiring for Ttl<M> {
    fn set_with_timeout(
        &mut self,
        key: Key,
        value: M::Value,
        timeout: Option<Duration>,
    ) -> Result<()> {
        if self.is_reserved(&key) {
            return Err(CacheError::ReservedKey(format!(
                "reserved key name '{}'",
                INDEX_KEY
            )));
        }
        self.inner.set(key.clone(), value)?;
        let expires_at = deadline(timeout.unwrap_or(self.default_timeout));
        self.index.insert(key, expires_at);
        Ok(())
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    fn time_to_live(&mut self, key: &Key) -> Result<Option<Duration>> {
        if !self.contains(key)? {
            return Err(CacheError::KeyNotFound(key.clone()));
        }
        Ok(self.index.expiry(key).flatten().map(|at| {
            Duration::from_millis(at.saturating_sub(current_timestamp_ms()))
        }))
    }

    fn sweep(&mut self) -> Result<usize> {
        let mut removed = 0;
        for key in self.data_keys()? {
            if self.expire_if_due(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn expirations(&self) -> u64 {
        self.expirations
    }
}
