//! Cleanup Task
//!
//! Background task that periodically sweeps expired and corrupted entries
//! out of the cache directory.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::FileCache;

/// Shortest pause between sweeps.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns a background task that periodically runs [`FileCache::cleanup`].
///
/// The sweep does blocking file I/O, so each run is moved onto the blocking
/// pool rather than stalling the runtime's worker threads.
///
/// # Arguments
/// * `cache` - Shared handle to the cache directory
/// * `cleanup_interval_secs` - Interval in seconds between sweeps, at least 1
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(FileCache::open(CacheConfig::default())?);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<FileCache>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs).max(MIN_INTERVAL);

    tokio::spawn(async move {
        info!(
            "Starting cache cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let cache = Arc::clone(&cache);
            match tokio::task::spawn_blocking(move || cache.cleanup()).await {
                Ok(removed) if removed > 0 => {
                    info!("Cache cleanup: removed {} entries", removed)
                }
                Ok(_) => debug!("Cache cleanup: nothing to remove"),
                Err(err) => error!(error = %err, "cache cleanup run failed"),
            }
        }
    })
}
