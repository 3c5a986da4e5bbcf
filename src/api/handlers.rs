//! API Handlers
//!
//! HTTP request handlers for each admin endpoint. Every cache call does
//! blocking file I/O and is run on tokio's blocking pool.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::{CacheSummary, EntryMeta, FileCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest, KeysResponse,
    RebuildResponse, RemovedResponse, SetRequest, SetResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared handle to the cache directory
    pub cache: Arc<FileCache>,
}

impl AppState {
    /// Creates a new AppState around an opened cache.
    pub fn new(cache: FileCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens (and creates if needed) the configured cache directory.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = FileCache::open(config.cache_config())?;
        Ok(Self::new(cache))
    }

    /// Runs `op` against the cache on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileCache) -> T + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| CacheError::Internal(format!("cache task failed: {e}")))
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value in the cache with optional TTL and tags.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let payload = serde_json::to_vec(&req.value)
        .map_err(|e| CacheError::InvalidRequest(format!("unserializable value: {e}")))?;
    let max = state.cache.config().max_entry_size;
    if payload.len() > max {
        return Err(CacheError::CapacityExceeded {
            size: payload.len(),
            max,
        });
    }

    let key = req.key.clone();
    let stored = state
        .run(move |cache| cache.set(&req.key, &payload, req.ttl, &req.tag_refs()))
        .await??;
    if !stored {
        return Err(CacheError::Internal(format!("Key '{}' could not be stored", key)));
    }

    Ok(Json(SetResponse::new(key)))
}

/// Handler for GET /get/:key
///
/// Absent, expired and corrupted entries all answer 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let lookup = key.clone();
    let payload = state
        .run(move |cache| cache.get(&lookup))
        .await?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::from_payload(key, &payload)))
}

/// Handler for GET /meta/:key
pub async fn meta_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryMeta>> {
    let lookup = key.clone();
    state
        .run(move |cache| cache.get_meta(&lookup))
        .await?
        .map(Json)
        .ok_or(CacheError::NotFound(key))
}

/// Handler for DELETE /del/:key
///
/// Deleting a key that does not exist still succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let target = key.clone();
    if !state.run(move |cache| cache.delete(&target)).await? {
        return Err(CacheError::Internal(format!("Key '{}' could not be deleted", key)));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for GET /keys
pub async fn keys_handler(State(state): State<AppState>) -> Result<Json<KeysResponse>> {
    let keys = state.run(|cache| cache.get_all_keys()).await?;
    Ok(Json(KeysResponse::new(keys)))
}

/// Handler for GET /summary
pub async fn summary_handler(State(state): State<AppState>) -> Result<Json<CacheSummary>> {
    let summary = state.run(|cache| cache.get_summary()).await?;
    Ok(Json(summary))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Result<Json<RemovedResponse>> {
    let removed = state.run(|cache| cache.cleanup()).await?;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<RemovedResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state
        .run(move |cache| cache.invalidate_by_tags(&req.tag_refs()))
        .await?;
    Ok(Json(RemovedResponse { removed }))
}

/// Handler for POST /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let cleared = state.run(|cache| cache.clear()).await?;
    Ok(Json(ClearResponse { cleared }))
}

/// Handler for POST /index/rebuild
pub async fn rebuild_index_handler(
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>> {
    let entries = state.run(|cache| cache.rebuild_index()).await?;
    Ok(Json(RebuildResponse { entries }))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
