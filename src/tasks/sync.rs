//! Sweep and Sync Task
//!
//! Background task that periodically expires stale entries and persists the
//! cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ServedCache;
use crate::cache::{Expiring, Mapping};

/// Spawns a background task that sweeps expired entries and syncs the cache.
///
/// Each run takes the write lock, deletes every expired key, then writes the
/// buffered values and the expiry index to disk. Failures are logged and the
/// task keeps running.
///
/// # Arguments
/// * `cache` - shared reference to the served cache
/// * `sync_interval_secs` - Interval in seconds between runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_sync_task(cache: Arc<RwLock<ServedCache>>, sync_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sync_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting sweep and sync task with interval of {} seconds",
            sync_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let mut guard = cache.write().await;
            match guard.shelf.sweep() {
                Ok(0) => debug!("Sweep: no expired entries found"),
                Ok(removed) => info!("Sweep: removed {} expired entries", removed),
                Err(err) => warn!(error = %err, "Sweep failed"),
            }
            if let Err(err) = guard.shelf.sync() {
                warn!(error = %err, "Background sync failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AppState;
    use crate::cache::{open_with_codec, Json, Key, ShelfOptions};
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sync_task_removes_expired_entries() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("cache");
        let shelf = open_with_codec(&dir, ShelfOptions::default(), Json::new()).unwrap();
        let state = AppState::new(shelf);

        {
            let mut guard = state.cache.write().await;
            guard
                .shelf
                .set_with_timeout(
                    Key::from("expire_soon"),
                    json!("value"),
                    Some(Duration::from_millis(200)),
                )
                .unwrap();
        }

        let handle = spawn_sync_task(state.cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        {
            let guard = state.cache.read().await;
            assert_eq!(guard.shelf.expirations(), 1);
        }
        assert!(!dir.join(Key::from("expire_soon").to_hex()).exists());

        handle.abort();
    }

    #[tokio::test]
    async fn test_sync_task_flushes_buffered_writes() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("cache");
        let shelf = open_with_codec(&dir, ShelfOptions::default(), Json::new()).unwrap();
        let state = AppState::new(shelf);

        {
            let mut guard = state.cache.write().await;
            guard
                .shelf
                .set(Key::from("long_lived"), json!({"n": 1}))
                .unwrap();
        }
        assert!(!dir.join(Key::from("long_lived").to_hex()).exists());

        let handle = spawn_sync_task(state.cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(dir.join(Key::from("long_lived").to_hex()).is_file());
        {
            let mut guard = state.cache.write().await;
            assert_eq!(guard.shelf.get(&Key::from("long_lived")).unwrap(), json!({"n": 1}));
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_sync_task_can_be_aborted() {
        let tmp = tempdir().unwrap();
        let shelf =
            open_with_codec(tmp.path().join("cache"), ShelfOptions::default(), Json::new())
                .unwrap();
        let state = AppState::new(shelf);

        let handle = spawn_sync_task(state.cache.clone(), 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
