//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::cache::{
    open_with_codec, Expiring, Json as JsonCodec, LruTimeoutShelf, Mapping,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, SetRequest, SetResponse, StatsResponse,
    SyncResponse,
};

/// The store the server exposes: JSON values on disk behind LRU and TTL.
pub type ServerCache = LruTimeoutShelf<JsonCodec<serde_json::Value>>;

/// The served store together with its lookup counters.
///
/// Evictions and expirations are counted by the decorators themselves; only
/// hits and misses are a property of the HTTP surface.
pub struct ServedCache {
    pub shelf: ServerCache,
    /// GET requests that found a live value
    pub hits: u64,
    /// GET requests for absent or expired keys
    pub misses: u64,
}

impl ServedCache {
    pub fn new(shelf: ServerCache) -> Self {
        Self {
            shelf,
            hits: 0,
            misses: 0,
        }
    }

    /// Current counters plus the live entry count. Counting entries lazily
    /// expires keys, hence `&mut self`.
    pub fn stats(&mut self) -> Result<StatsResponse> {
        Ok(StatsResponse::new(
            self.hits,
            self.misses,
            self.shelf.evictions(),
            self.shelf.expirations(),
            self.shelf.len()?,
        ))
    }
}

/// Application state shared across all handlers.
///
/// Contains the served cache wrapped in Arc<RwLock<>> for thread-safe access.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache
    pub cache: Arc<RwLock<ServedCache>>,
}

impl AppState {
    /// Creates a new AppState around an opened shelf.
    pub fn new(shelf: ServerCache) -> Self {
        Self {
            cache: Arc::new(RwLock::new(ServedCache::new(shelf))),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens `cache_dir` with the configured flag, size bound and default TTL.
    pub fn from_config(config: &Config) -> Result<Self> {
        let shelf = open_with_codec(
            &config.cache_dir,
            config.shelf_options()?,
            JsonCodec::new(),
        )?;
        info!(
            dir = %config.cache_dir.display(),
            max_entries = config.max_entries,
            default_ttl = config.default_ttl,
            "Cache ready"
        );
        Ok(Self::new(shelf))
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair in the cache with optional TTL in seconds.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut cache = state.cache.write().await;
    let key = cache.shelf.text_key(&req.key)?;
    cache.shelf.set_with_timeout(
        key,
        req.value,
        req.ttl.map(Duration::from_secs),
    )?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value and its remaining lifetime.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    // Write lock: reads touch the LRU queue and may expire the key
    let mut cache = state.cache.write().await;
    let cache_key = cache.shelf.text_key(&key)?;

    let value = match cache.shelf.get(&cache_key) {
        Ok(value) => {
            cache.hits += 1;
            value
        }
        Err(err) => {
            if matches!(err, CacheError::KeyNotFound(_)) {
                cache.misses += 1;
            }
            return Err(err);
        }
    };
    let ttl = cache
        .shelf
        .time_to_live(&cache_key)?
        .map(|remaining| remaining.as_secs_f64().ceil() as u64);

    Ok(Json(GetResponse::new(key, value, ttl)))
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let mut cache = state.cache.write().await;
    let cache_key = cache.shelf.text_key(&key)?;
    cache.shelf.delete(&cache_key)?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /sync
///
/// Writes buffered values and the expiry index to disk.
pub async fn sync_handler(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let mut cache = state.cache.write().await;
    cache.shelf.sync()?;
    let entries = cache.shelf.len()?;

    Ok(Json(SyncResponse::new(entries)))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    // Counting entries lazily expires keys, so this needs the write lock
    let mut cache = state.cache.write().await;
    Ok(Json(cache.stats()?))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
