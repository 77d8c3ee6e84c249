//! Filecache - A persistent file-per-key cache
//!
//! Provides a dictionary-like store with write buffering, LRU eviction and
//! TTL expiration, plus a small HTTP server in front of it.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{open, Mapping, ShelfOptions};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sync_task;
