//! Shelf Module
//!
//! Ready-made decorator stacks over the in-memory map and the file cache.
//!
//! In every combined stack LRU is the outer layer. Its evictions go through
//! the TTL layer's `delete`, so an evicted key also leaves the expiry index.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::backend::BackingStore;
use crate::cache::codec::{Codec, RawBytes};
use crate::cache::directory::{DirectoryStore, DEFAULT_FILE_MODE};
use crate::cache::file_cache::FileCache;
use crate::cache::flags::OpenFlags;
use crate::cache::key::KeyEncoding;
use crate::cache::lru::Lru;
use crate::cache::mapping::{Mapping, MemoryMap};
use crate::cache::ttl::Ttl;
use crate::error::Result;

/// Default bound for LRU stacks.
pub const DEFAULT_MAX_SIZE: usize = 300;

/// Default timeout for TTL stacks: never expire.
pub const DEFAULT_TIMEOUT: Duration = Duration::ZERO;

pub type LruDict<V> = Lru<MemoryMap<V>>;
pub type TimeoutDict<V> = Ttl<MemoryMap<V>>;
pub type LruTimeoutDict<V> = Lru<Ttl<MemoryMap<V>>>;

pub type LruShelf<C = RawBytes, S = DirectoryStore> = Lru<FileCache<C, S>>;
pub type TimeoutShelf<C = RawBytes, S = DirectoryStore> = Ttl<FileCache<C, S>>;
pub type LruTimeoutShelf<C = RawBytes, S = DirectoryStore> = Lru<Ttl<FileCache<C, S>>>;

/// Stacks LRU over TTL over `inner`.
pub fn lru_timeout<M: Mapping>(
    inner: M,
    max_size: usize,
    default_timeout: Duration,
) -> Result<Lru<Ttl<M>>> {
    Lru::new(Ttl::new(inner, default_timeout)?, max_size)
}

// == Shelf Options ==
/// How [`open`] opens and decorates a cache directory.
#[derive(Debug, Clone)]
pub struct ShelfOptions {
    pub flags: OpenFlags,
    pub max_size: usize,
    pub default_timeout: Duration,
    /// Permission bits for written files
    pub mode: u32,
    /// Encoding for text keys
    pub key_encoding: KeyEncoding,
}

impl Default for ShelfOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::default(),
            max_size: DEFAULT_MAX_SIZE,
            default_timeout: DEFAULT_TIMEOUT,
            mode: DEFAULT_FILE_MODE,
            key_encoding: KeyEncoding::default(),
        }
    }
}

impl ShelfOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and sets the flag string.
    pub fn flag(mut self, flag: &str) -> Result<Self> {
        self.flags = flag.parse()?;
        Ok(self)
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }
}

// == Open ==
/// Opens (or creates) a raw-bytes cache directory wrapped in LRU and TTL.
pub fn open(dir: impl Into<PathBuf>, options: ShelfOptions) -> Result<LruTimeoutShelf> {
    open_with_codec(dir, options, RawBytes)
}

/// Like [`open`], with values encoded by `codec`.
pub fn open_with_codec<C: Codec>(
    dir: impl Into<PathBuf>,
    options: ShelfOptions,
    codec: C,
) -> Result<LruTimeoutShelf<C>> {
    let store = DirectoryStore::new(dir).with_mode(options.mode);
    open_store(store, options, codec)
}

/// Like [`open`], over any backing store.
pub fn open_store<C: Codec, S: BackingStore>(
    store: S,
    options: ShelfOptions,
    codec: C,
) -> Result<LruTimeoutShelf<C, S>> {
    let cache =
        FileCache::with_store(store, options.flags, codec)?.with_key_encoding(options.key_encoding);
    lru_timeout(cache, options.max_size, options.default_timeout)
}
