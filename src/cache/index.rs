//! Index Module
//!
//! Secondary `key -> metadata` map kept in `cache_index.json`.
//!
//! The index is derived data. Entry files stay authoritative, so every
//! index failure is logged and swallowed rather than failing the entry
//! operation that triggered it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::entry::EntryHeader;
use crate::cache::lock::LockManager;
use crate::cache::store::CacheStore;
use crate::cache::INDEX_FILE_NAME;
use crate::error::{CacheError, Result};

// == Index Record ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub expires_at: Option<u64>,
    pub tags: BTreeSet<String>,
    pub size: u64,
}

impl From<&EntryHeader> for IndexRecord {
    fn from(header: &EntryHeader) -> Self {
        Self {
            expires_at: header.expires_at,
            tags: header.tags.clone(),
            size: header.size_bytes,
        }
    }
}

pub type IndexMap = BTreeMap<String, IndexRecord>;

const MAX_INDEX_BYTES: usize = 64 * 1024 * 1024;

// == Index ==
#[derive(Debug, Clone)]
pub struct Index {
    path: PathBuf,
    store: CacheStore,
    locks: LockManager,
}

impl Index {
    pub fn new(store: CacheStore, locks: LockManager) -> Self {
        Self {
            path: store.root().join(INDEX_FILE_NAME),
            store,
            locks,
        }
    }

    /// Current records; a missing or unreadable index reads as empty.
    pub fn load(&self) -> IndexMap {
        match self.store.read(&self.path, MAX_INDEX_BYTES) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable index");
                IndexMap::new()
            }),
            Err(CacheError::NotFound(_)) => IndexMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read index");
                IndexMap::new()
            }
        }
    }

    pub fn upsert(&self, key: &str, record: IndexRecord) {
        self.update(|index| {
            index.insert(key.to_string(), record);
            true
        });
    }

    pub fn remove(&self, key: &str) {
        self.update(|index| index.remove(key).is_some());
    }

    pub fn remove_many(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        self.update(|index| {
            let before = index.len();
            for key in keys {
                index.remove(key);
            }
            index.len() != before
        });
    }

    /// Replaces the whole index with `records`.
    pub fn replace(&self, records: IndexMap) {
        self.update(move |index| {
            *index = records;
            true
        });
    }

    /// Deletes the index file.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.locks.acquire(&self.path)?;
        self.store.remove(&self.path)?;
        Ok(())
    }

    /// Read-modify-write under the index lock. `apply` returns whether
    /// anything changed; unchanged indexes are not rewritten.
    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut IndexMap) -> bool,
    {
        if let Err(err) = self.try_update(apply) {
            warn!(error = %err, kind = err.kind(), "index update skipped");
        }
    }

    fn try_update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut IndexMap) -> bool,
    {
        let _guard = self.locks.acquire(&self.path)?;
        let mut index = self.load();
        if !apply(&mut index) {
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(&index)
            .map_err(|e| CacheError::Internal(format!("index serialization failed: {e}")))?;
        self.store.write(&self.path, &json)?;
        debug!(records = index.len(), "index rewritten");
        Ok(())
    }
}
