//! Cache Module
//!
//! A persistent file cache with a write buffer, and composable LRU eviction
//! and TTL expiration decorators over any [`Mapping`].

mod backend;
mod codec;
mod directory;
mod file_cache;
mod flags;
mod key;
mod lru;
mod mapping;
mod shelf;
mod ttl;


// Re-export public types
pub use backend::{BackingStore, MemoryStore};
pub use codec::{Codec, Json, RawBytes};
pub use directory::{DirectoryStore, DEFAULT_FILE_MODE};
pub use file_cache::FileCache;
pub use flags::{Existence, OpenFlags};
pub use key::{Key, KeyEncoding};
pub use lru::{Lru, LruTracker};
pub use mapping::{scoped, Mapping, MemoryMap};
pub use shelf::{
    lru_timeout, open, open_store, open_with_codec, LruDict, LruShelf, LruTimeoutDict,
    LruTimeoutShelf, ShelfOptions, TimeoutDict, TimeoutShelf, DEFAULT_MAX_SIZE,
    DEFAULT_TIMEOUT,
};
pub use ttl::{current_timestamp_ms, Expiring, ExpiryIndex, Ttl, INDEX_KEY};
