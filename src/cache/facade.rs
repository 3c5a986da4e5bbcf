//! File Cache Facade
//!
//! The public operation set over the store, codec, locks, index and
//! garbage collector.
//!
//! Every failure that can be read as "not cached" is logged here and
//! returned as a miss, `false` or `0`. The one exception is
//! [`CacheError::LockTimeout`] on the write path, which is returned to the
//! caller because the write did not happen.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::codec::EntryCodec;
use crate::cache::entry::{current_timestamp_ms, CacheEntry, EntryMeta};
use crate::cache::gc::GarbageCollector;
use crate::cache::index::{Index, IndexMap, IndexRecord};
use crate::cache::lock::LockManager;
use crate::cache::store::CacheStore;
use crate::cache::summary::CacheSummary;
use crate::cache::ACCESS_CONTROL_FILE;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

const ACCESS_CONTROL_RULES: &str = "\
# Deny access to cache files
Order deny,allow
Deny from all
<Files ~ \"\\.(cache|tmp|lock|json)$\">
    Deny from all
</Files>
";

// == File Cache ==
/// Handle to one cache directory.
///
/// Construct one per process (or request) and pass it by reference.
/// Independent handles on the same directory, in this process or others,
/// coordinate through the filesystem alone.
#[derive(Debug, Clone)]
pub struct FileCache {
    config: CacheConfig,
    store: CacheStore,
    codec: EntryCodec,
    locks: LockManager,
    index: Index,
    gc: GarbageCollector,
}

impl FileCache {
    // == Constructor ==
    /// Opens (creating if needed) the cache directory described by `config`.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let store = CacheStore::open(&config.cache_dir)?;
        let codec = EntryCodec::new(
            config.compression,
            config.compression_level,
            config.max_entry_size,
        );
        let locks = LockManager::new(
            config.lock_timeout,
            config.lock_poll_interval,
            config.lock_stale_after,
        );
        let index = Index::new(store.clone(), locks.clone());
        let gc = GarbageCollector::new(
            store.clone(),
            codec.clone(),
            locks.clone(),
            index.clone(),
            config.gc_probability,
            config.lock_stale_after,
        );

        write_access_control(store.root());
        info!(dir = %store.root().display(), "file cache opened");

        Ok(Self {
            config,
            store,
            codec,
            locks,
            index,
            gc,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Set ==
    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// `ttl` of None uses the configured default; `Some(0)` never expires.
    /// Returns `Ok(false)` when the entry was not stored (too large, disk
    /// error) and `Err(LockTimeout)` when the key's lock could not be taken.
    /// A failed write never disturbs the entry it was meant to replace.
    pub fn set(&self, key: &str, payload: &[u8], ttl: Option<u64>, tags: &[&str]) -> Result<bool> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(key, payload.to_vec(), ttl, tags.iter().copied());
        let path = self.store.entry_path(key);

        let stored = {
            let _guard = self.locks.acquire(&path)?;
            self.write_locked(&path, &entry)
        };

        if stored && self.gc.is_due() {
            debug!("write-triggered sweep");
            self.gc.sweep();
        }
        Ok(stored)
    }

    /// Serializes `value` as JSON and stores it.
    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        tags: &[&str],
    ) -> Result<bool> {
        match serde_json::to_vec(value) {
            Ok(payload) => self.set(key, &payload, ttl, tags),
            Err(err) => {
                error!(key, error = %err, "failed to serialize value");
                Ok(false)
            }
        }
    }

    /// Stores every item; true only if all were stored.
    pub fn set_many<'a, I>(&self, items: I, ttl: Option<u64>, tags: &[&str]) -> Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut all_stored = true;
        for (key, payload) in items {
            all_stored &= self.set(key, payload, ttl, tags)?;
        }
        Ok(all_stored)
    }

    /// Encode and write with the key's lock already held.
    fn write_locked(&self, path: &Path, entry: &CacheEntry) -> bool {
        let key = entry.key();
        let blob = match self.codec.encode(entry) {
            Ok(blob) => blob,
            Err(err @ CacheError::CapacityExceeded { .. }) => {
                warn!(key, error = %err, "entry too large, not caching");
                return false;
            }
            Err(err) => {
                error!(key, error = %err, "failed to encode entry");
                return false;
            }
        };

        if let Err(err) = self.store.write(path, &blob) {
            error!(key, path = %path.display(), error = %err, "failed to write cache entry");
            return false;
        }

        self.index.upsert(key, IndexRecord::from(&entry.header));
        debug!(key, ttl = entry.header.ttl_seconds, "cached entry");
        true
    }

    // == Get ==
    /// Returns the payload, or None when absent, expired or corrupted.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.load(key).map(|entry| entry.payload)
    }

    /// Returns the payload or `default` on a miss.
    pub fn get_or(&self, key: &str, default: Vec<u8>) -> Vec<u8> {
        self.get(key).unwrap_or(default)
    }

    /// Returns the payload decoded from JSON, None on a miss or type mismatch.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "cached payload is not the requested type");
                None
            }
        }
    }

    pub fn get_many<'a, I>(&self, keys: I) -> BTreeMap<String, Option<Vec<u8>>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .map(|key| (key.to_string(), self.get(key)))
            .collect()
    }

    // == Has ==
    /// Same expiry and corruption handling as [`FileCache::get`].
    pub fn has(&self, key: &str) -> bool {
        self.load(key).is_some()
    }

    /// Reads a valid entry, evicting it if it is expired or corrupted.
    fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.store.entry_path(key);
        match self.try_load(key, &path) {
            Ok(entry) => Some(entry),
            Err(CacheError::NotFound(_)) => None,
            Err(CacheError::Expired(_)) => {
                debug!(key, "cache entry expired");
                self.gc.evict(&path, Some(key), "expired");
                None
            }
            Err(CacheError::Corrupted(reason)) => {
                warn!(key, path = %path.display(), reason = %reason, "corrupted cache entry");
                self.gc.evict(&path, Some(key), "corrupted");
                None
            }
            Err(err) => {
                error!(key, path = %path.display(), error = %err, kind = err.kind(), "cache read failed");
                None
            }
        }
    }

    fn try_load(&self, key: &str, path: &Path) -> Result<CacheEntry> {
        let entry = self.codec.load(&self.store, path)?;
        if entry.key() != key {
            return Err(CacheError::Corrupted(format!(
                "entry holds key {:?}",
                entry.key()
            )));
        }
        if entry.is_expired() {
            return Err(CacheError::Expired(key.to_string()));
        }
        Ok(entry)
    }

    // == Delete ==
    /// Removes an entry under its lock. Deleting a missing key succeeds.
    ///
    /// False when the file could not be removed or the lock could not be
    /// taken in time.
    pub fn delete(&self, key: &str) -> bool {
        let path = self.store.entry_path(key);
        let _guard = match self.locks.acquire(&path) {
            Ok(guard) => guard,
            Err(err) => {
                warn!(key, error = %err, kind = err.kind(), "delete skipped, entry lock unavailable");
                return false;
            }
        };

        match self.store.remove(&path) {
            Ok(removed) => {
                self.index.remove(key);
                if removed {
                    info!(key, "deleted cache entry");
                }
                true
            }
            Err(err) => {
                error!(key, path = %path.display(), error = %err, "failed to delete cache entry");
                false
            }
        }
    }

    // == Clear ==
    /// Removes every entry and the index.
    pub fn clear(&self) -> bool {
        let paths = match self.store.list_entries() {
            Ok(paths) => paths,
            Err(err) => {
                error!(error = %err, "failed to list cache directory");
                return false;
            }
        };

        let mut success = true;
        for path in paths {
            if let Err(err) = self.store.remove(&path) {
                error!(path = %path.display(), error = %err, "failed to clear cache file");
                success = false;
            }
        }

        if let Err(err) = self.index.clear() {
            error!(error = %err, "failed to remove cache index");
            success = false;
        }

        if success {
            info!("Cache cleared successfully");
        }
        success
    }

    // == Cleanup ==
    /// Explicit sweep; returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        self.gc.sweep().removed()
    }

    // == Invalidate By Tags ==
    /// Removes every entry carrying at least one of `tags`.
    pub fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        if tags.is_empty() {
            return 0;
        }

        let mut removed_keys = Vec::new();
        for (path, entry) in self.scan() {
            let Ok(entry) = entry else { continue };
            if !entry.header.has_any_tag(tags) {
                continue;
            }
            match self.store.remove(&path) {
                Ok(true) => removed_keys.push(entry.header.key),
                Ok(false) => {}
                Err(err) => error!(path = %path.display(), error = %err, "failed to invalidate entry"),
            }
        }

        self.index.remove_many(&removed_keys);
        info!(?tags, count = removed_keys.len(), "invalidated cache entries by tag");
        removed_keys.len()
    }

    // == Get All Keys ==
    /// Keys of every entry that is currently valid.
    pub fn get_all_keys(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        let mut keys: Vec<String> = self
            .scan()
            .into_iter()
            .filter_map(|(_, entry)| entry.ok())
            .filter(|entry| !entry.header.is_expired_at(now))
            .map(|entry| entry.header.key)
            .collect();
        keys.sort();
        keys
    }

    // == Get Meta ==
    /// Entry metadata without the payload. Does not evict.
    pub fn get_meta(&self, key: &str) -> Option<EntryMeta> {
        let path = self.store.entry_path(key);
        match self.codec.load(&self.store, &path) {
            Ok(entry) if entry.key() == key => Some(EntryMeta::from_header(&entry.header)),
            Ok(_) | Err(CacheError::NotFound(_)) => None,
            Err(err) => {
                debug!(key, error = %err, "no metadata available");
                None
            }
        }
    }

    // == Get Summary ==
    pub fn get_summary(&self) -> CacheSummary {
        let mut summary = CacheSummary::new(self.store.root().display().to_string());
        let now = current_timestamp_ms();

        for (path, entry) in self.scan() {
            let size = self.store.file_size(&path);
            match entry {
                Ok(entry) if entry.header.is_expired_at(now) => summary.record_expired(size),
                Ok(_) => summary.record_valid(size),
                Err(_) => summary.record_corrupted(size),
            }
        }
        summary
    }

    // == Remember ==
    /// Returns the cached payload, or computes, stores and returns it.
    ///
    /// A failed store is logged; the computed value is returned regardless.
    pub fn remember<F>(&self, key: &str, ttl: Option<u64>, compute: F) -> Vec<u8>
    where
        F: FnOnce() -> Vec<u8>,
    {
        if let Some(payload) = self.get(key) {
            return payload;
        }

        let payload = compute();
        if let Err(err) = self.set(key, &payload, ttl, &[]) {
            warn!(key, error = %err, "remember could not store computed value");
        }
        payload
    }

    /// JSON flavour of [`FileCache::remember`].
    pub fn remember_json<T, F>(&self, key: &str, ttl: Option<u64>, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get_json(key) {
            return value;
        }

        let value = compute();
        if let Err(err) = self.set_json(key, &value, ttl, &[]) {
            warn!(key, error = %err, "remember could not store computed value");
        }
        value
    }

    // == Increment / Decrement ==
    /// Adds `amount` to a JSON integer entry under the key's lock.
    ///
    /// A missing entry starts from zero. Returns `Ok(None)` when the stored
    /// payload is not an integer or the new value could not be stored.
    pub fn increment(&self, key: &str, amount: i64) -> Result<Option<i64>> {
        let path = self.store.entry_path(key);
        let _guard = self.locks.acquire(&path)?;

        let (current, ttl, tags) = match self.try_load(key, &path) {
            Ok(entry) => match serde_json::from_slice::<i64>(&entry.payload) {
                Ok(value) => (value, entry.header.ttl_seconds, entry.header.tags),
                Err(_) => {
                    warn!(key, "cannot adjust a non-integer cache entry");
                    return Ok(None);
                }
            },
            Err(_) => (0, self.config.default_ttl, Default::default()),
        };

        let Some(next) = current.checked_add(amount) else {
            warn!(key, current, amount, "counter overflow");
            return Ok(None);
        };

        let entry = CacheEntry::new(key, next.to_string().into_bytes(), ttl, tags);
        Ok(self.write_locked(&path, &entry).then_some(next))
    }

    pub fn decrement(&self, key: &str, amount: i64) -> Result<Option<i64>> {
        match amount.checked_neg() {
            Some(negated) => self.increment(key, negated),
            None => Ok(None),
        }
    }

    // == Index ==
    /// Current contents of the secondary index.
    pub fn index_records(&self) -> IndexMap {
        self.index.load()
    }

    /// Regenerates the index from the entry files; returns the record count.
    pub fn rebuild_index(&self) -> usize {
        let records: IndexMap = self
            .scan()
            .into_iter()
            .filter_map(|(_, entry)| entry.ok())
            .map(|entry| {
                let record = IndexRecord::from(&entry.header);
                (entry.header.key, record)
            })
            .collect();
        let count = records.len();
        self.index.replace(records);
        info!(records = count, "cache index rebuilt");
        count
    }

    /// Decodes every entry file currently listed in the directory.
    fn scan(&self) -> Vec<(PathBuf, Result<CacheEntry>)> {
        let paths = match self.store.list_entries() {
            Ok(paths) => paths,
            Err(err) => {
                error!(error = %err, "failed to list cache directory");
                return Vec::new();
            }
        };

        paths
            .into_iter()
            .filter_map(|path| match self.codec.load(&self.store, &path) {
                // Removed since the listing
                Err(CacheError::NotFound(_)) => None,
                result => Some((path, result)),
            })
            .collect()
    }
}

/// Drops a deny-all rule into the directory so a web server never serves it.
fn write_access_control(root: &Path) {
    let path = root.join(ACCESS_CONTROL_FILE);
    if path.exists() {
        return;
    }
    match fs::write(&path, ACCESS_CONTROL_RULES) {
        Ok(()) => debug!(path = %path.display(), "access control file created"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to create access control file"),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    use crate::cache::INDEX_FILE_NAME;

    fn cache_with(config: impl FnOnce(CacheConfig) -> CacheConfig) -> (tempfile::TempDir, FileCache) {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            CacheConfig::new(dir.path().join("cache"))
                .with_default_ttl(300)
                .with_gc_probability(0)
                .with_lock_timeout(Duration::from_millis(200))
                .with_lock_poll_interval(Duration::from_millis(5)),
        );
        let cache = FileCache::open(config).unwrap();
        (dir, cache)
    }

    fn cache() -> (tempfile::TempDir, FileCache) {
        cache_with(|c| c)
    }

    #[test]
    fn test_open_writes_access_control_file() {
        let (_dir, cache) = cache();
        let rules = fs::read_to_string(cache.store.root().join(ACCESS_CONTROL_FILE)).unwrap();
        assert!(rules.contains("Deny from all"));
    }

    #[test]
    fn test_set_and_get() {
        let (_dir, cache) = cache();

        assert!(cache.set("key1", b"value1", None, &[]).unwrap());
        assert_eq!(cache.get("key1").unwrap(), b"value1");
        assert!(cache.has("key1"));
    }

    #[test]
    fn test_get_missing_returns_default() {
        let (_dir, cache) = cache();

        assert!(cache.get("nonexistent").is_none());
        assert_eq!(cache.get_or("nonexistent", b"fallback".to_vec()), b"fallback");
        assert!(!cache.has("nonexistent"));
    }

    #[test]
    fn test_overwrite() {
        let (_dir, cache) = cache();

        cache.set("key1", b"value1", None, &["old"]).unwrap();
        cache.set("key1", b"value2", None, &["new"]).unwrap();

        assert_eq!(cache.get("key1").unwrap(), b"value2");
        let meta = cache.get_meta("key1").unwrap();
        assert!(meta.tags.contains("new"));
        assert!(!meta.tags.contains("old"));
        assert_eq!(cache.get_all_keys(), vec!["key1".to_string()]);
    }

    #[test]
    fn test_ttl_expiration_removes_file() {
        let (_dir, cache) = cache();
        cache.set("key1", b"value1", Some(1), &[]).unwrap();
        let path = cache.store.entry_path("key1");

        assert!(cache.get("key1").is_some());

        // Wait for expiration
        sleep(Duration::from_millis(1100));

        assert!(cache.get("key1").is_none());
        assert!(!path.exists());
        assert!(!cache.index_records().contains_key("key1"));
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (_dir, cache) = cache_with(|c| c.with_default_ttl(1));
        cache.set("forever", b"v", Some(0), &[]).unwrap();

        let meta = cache.get_meta("forever").unwrap();
        assert!(meta.expires_at.is_none());
        assert!(meta.remaining_ttl_seconds.is_none());
    }

    #[test]
    fn test_corruption_is_miss_and_deletes_file() {
        let (_dir, cache) = cache_with(|c| c.with_compression(false));
        cache.set("key1", b"precious payload", None, &[]).unwrap();
        let path = cache.store.entry_path("key1");

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x20;
        fs::write(&path, bytes).unwrap();

        assert!(cache.get("key1").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_capacity_rejection_writes_nothing() {
        let (_dir, cache) = cache_with(|c| c.with_max_entry_size(16));

        assert!(!cache.set("big", &[1u8; 17], None, &[]).unwrap());
        assert!(cache.get("big").is_none());
        assert!(!cache.store.entry_path("big").exists());
        assert!(cache.index_records().is_empty());
    }

    #[test]
    fn test_capacity_rejection_keeps_previous_entry() {
        let (_dir, cache) = cache_with(|c| c.with_max_entry_size(1024));

        assert!(cache.set("key", b"small", None, &[]).unwrap());
        assert!(!cache.set("key", &[1u8; 2048], None, &[]).unwrap());
        assert_eq!(cache.get("key").unwrap(), b"small");
    }

    #[test]
    fn test_header_counts_toward_entry_size_limit() {
        let (_dir, cache) =
            cache_with(|c| c.with_max_entry_size(256).with_compression(false));

        // The payload alone fits, the encoded file does not
        assert!(!cache.set("key", &[1u8; 250], None, &["dashboard"]).unwrap());
        assert!(!cache.store.entry_path("key").exists());
        assert!(cache.set("key", &[1u8; 16], None, &["dashboard"]).unwrap());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, cache) = cache();
        cache.set("key1", b"v", None, &[]).unwrap();

        assert!(cache.delete("key1"));
        assert!(cache.delete("key1"));
        assert!(cache.delete("never-existed"));
        assert!(cache.get("key1").is_none());
    }

    #[test]
    fn test_delete_waits_for_writer_lock() {
        let (_dir, cache) = cache_with(|c| c.with_lock_timeout(Duration::from_millis(30)));
        cache.set("key1", b"v", None, &["dash"]).unwrap();
        let path = cache.store.entry_path("key1");

        let held = cache.locks.acquire(&path).unwrap();
        assert!(!cache.delete("key1"));
        assert!(path.exists());
        assert!(cache.index_records().contains_key("key1"));

        drop(held);
        assert!(cache.delete("key1"));
        assert!(!path.exists());
        assert!(cache.index_records().is_empty());
    }

    #[test]
    fn test_lazy_eviction_spares_entry_rewritten_after_read() {
        let (_dir, cache) = cache();
        cache.set("k", b"stale", Some(1), &[]).unwrap();
        let path = cache.store.entry_path("k");
        sleep(Duration::from_millis(1100));

        // Reader observes the expiry, then a writer lands before eviction runs
        assert!(matches!(cache.try_load("k", &path), Err(CacheError::Expired(_))));
        assert!(cache.set("k", b"fresh", Some(3600), &[]).unwrap());
        assert!(!cache.gc.evict(&path, Some("k"), "expired"));

        assert_eq!(cache.get("k").unwrap(), b"fresh");
        assert!(cache.index_records().contains_key("k"));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let (_dir, cache) = cache();

        assert!(cache.set("k", b"v", Some(u64::MAX), &[]).unwrap());
        assert_eq!(cache.get("k").unwrap(), b"v");
        let meta = cache.get_meta("k").unwrap();
        assert_eq!(meta.expires_at, Some(u64::MAX));
        assert!(!meta.is_expired);
    }

    #[test]
    fn test_lock_timeout_is_surfaced() {
        let (_dir, cache) = cache_with(|c| c.with_lock_timeout(Duration::from_millis(30)));
        cache.set("key1", b"old", None, &[]).unwrap();

        let _held = cache.locks.acquire(&cache.store.entry_path("key1")).unwrap();
        let result = cache.set("key1", b"new", None, &[]);

        assert!(matches!(result, Err(CacheError::LockTimeout(_))));
        assert_eq!(cache.get("key1").unwrap(), b"old");
    }

    #[test]
    fn test_invalidate_by_tags() {
        let (_dir, cache) = cache();
        cache.set("a", b"x", None, &["t1"]).unwrap();
        cache.set("b", b"y", None, &["t2"]).unwrap();
        cache.set("c", b"z", None, &["t1", "t2"]).unwrap();

        assert_eq!(cache.invalidate_by_tags(&["t1"]), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_none());
        assert_eq!(cache.get("b").unwrap(), b"y");
        assert_eq!(cache.invalidate_by_tags(&[]), 0);
        assert_eq!(
            cache.index_records().keys().cloned().collect::<Vec<_>>(),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn test_summary_and_cleanup_accounting() {
        let (_dir, cache) = cache();
        for key in ["a", "b", "c"] {
            cache.set(key, b"long-lived", Some(3600), &[]).unwrap();
        }
        cache.set("d", b"short", Some(1), &[]).unwrap();
        cache.set("e", b"short", Some(1), &[]).unwrap();

        sleep(Duration::from_millis(1100));

        let summary = cache.get_summary();
        assert_eq!(summary.total_entries, 5);
        assert_eq!(summary.expired_entries, 2);
        assert_eq!(summary.valid_entries, 3);
        assert!(summary.total_size_bytes > 0);

        assert_eq!(cache.cleanup(), 2);
        assert_eq!(cache.get_summary().total_entries, 3);
        let mut keys = cache.get_all_keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_get_all_keys_skips_expired() {
        let (_dir, cache) = cache();
        cache.set("live", b"1", Some(3600), &[]).unwrap();
        cache.set("dying", b"2", Some(1), &[]).unwrap();

        sleep(Duration::from_millis(1100));

        assert_eq!(cache.get_all_keys(), vec!["live".to_string()]);
    }

    #[test]
    fn test_get_meta_reports_expired_without_deleting() {
        let (_dir, cache) = cache();
        cache.set("k", b"12345", Some(1), &["dash"]).unwrap();

        sleep(Duration::from_millis(1100));

        let meta = cache.get_meta("k").unwrap();
        assert!(meta.is_expired);
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(meta.remaining_ttl_seconds, Some(0));
        assert!(cache.store.entry_path("k").exists());
    }

    #[test]
    fn test_clear_removes_entries_and_index() {
        let (_dir, cache) = cache();
        cache.set("a", b"1", None, &[]).unwrap();
        cache.set("b", b"2", None, &[]).unwrap();

        assert!(cache.clear());
        assert!(cache.get_all_keys().is_empty());
        assert!(!cache.store.root().join(INDEX_FILE_NAME).exists());
        assert!(cache.store.root().join(ACCESS_CONTROL_FILE).exists());
    }

    #[test]
    fn test_remember_computes_once() {
        let (_dir, cache) = cache();
        let mut calls = 0;

        let first = cache.remember("expensive", Some(60), || {
            calls += 1;
            b"computed".to_vec()
        });
        let second = cache.remember("expensive", Some(60), || {
            calls += 1;
            b"recomputed".to_vec()
        });

        assert_eq!(first, b"computed");
        assert_eq!(second, b"computed");
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_remember_returns_value_when_store_fails() {
        let (_dir, cache) = cache_with(|c| c.with_max_entry_size(4));
        let value = cache.remember("big", None, || b"too large to cache".to_vec());
        assert_eq!(value, b"too large to cache");
        assert!(!cache.has("big"));
    }

    #[test]
    fn test_json_helpers() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Devices {
            ids: Vec<u32>,
            total: u32,
        }

        let (_dir, cache) = cache();
        let devices = Devices {
            ids: vec![1, 2, 3],
            total: 3,
        };
        assert!(cache.set_json("devices", &devices, None, &["devices"]).unwrap());
        assert_eq!(cache.get_json::<Devices>("devices").unwrap(), devices);
        assert!(cache.get_json::<u64>("devices").is_none());

        let counted: Vec<String> = cache.remember_json("names", None, || vec!["a".to_string()]);
        assert_eq!(counted, vec!["a"]);
        assert_eq!(cache.get_json::<Vec<String>>("names").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_get_many_and_set_many() {
        let (_dir, cache) = cache();
        let items: Vec<(&str, &[u8])> = vec![("a", &b"1"[..]), ("b", &b"2"[..])];

        assert!(cache.set_many(items, None, &["bulk"]).unwrap());

        let found = cache.get_many(["a", "b", "missing"]);
        assert_eq!(found["a"].as_deref(), Some(&b"1"[..]));
        assert_eq!(found["b"].as_deref(), Some(&b"2"[..]));
        assert_eq!(found["missing"], None);
        assert_eq!(cache.invalidate_by_tags(&["bulk"]), 2);
    }

    #[test]
    fn test_increment_and_decrement() {
        let (_dir, cache) = cache();

        assert_eq!(cache.increment("hits", 1).unwrap(), Some(1));
        assert_eq!(cache.increment("hits", 5).unwrap(), Some(6));
        assert_eq!(cache.decrement("hits", 2).unwrap(), Some(4));
        assert_eq!(cache.get_json::<i64>("hits"), Some(4));

        cache.set("text", b"\"hello\"", None, &[]).unwrap();
        assert_eq!(cache.increment("text", 1).unwrap(), None);
        assert_eq!(cache.get("text").unwrap(), b"\"hello\"");
    }

    #[test]
    fn test_increment_keeps_ttl_and_tags() {
        let (_dir, cache) = cache();
        cache.set_json("counter", &10, Some(120), &["stats"]).unwrap();

        cache.increment("counter", 1).unwrap();

        let meta = cache.get_meta("counter").unwrap();
        assert_eq!(meta.ttl_seconds, 120);
        assert!(meta.tags.contains("stats"));
    }

    #[test]
    fn test_rebuild_index_recovers_drift() {
        let (_dir, cache) = cache();
        cache.set("a", b"1", None, &["t"]).unwrap();
        cache.set("b", b"2", None, &[]).unwrap();

        // Simulate a crash between entry write and index update
        fs::remove_file(cache.store.root().join(INDEX_FILE_NAME)).unwrap();
        assert!(cache.index_records().is_empty());

        assert_eq!(cache.rebuild_index(), 2);
        let records = cache.index_records();
        assert!(records["a"].tags.contains("t"));
        assert_eq!(records["b"].size, 1);
    }

    #[test]
    fn test_write_triggered_sweep() {
        let (_dir, cache) = cache_with(|c| c.with_gc_probability(1));
        cache.set("dying", b"1", Some(1), &[]).unwrap();

        sleep(Duration::from_millis(1100));

        cache.set("fresh", b"2", None, &[]).unwrap();
        assert!(!cache.store.entry_path("dying").exists());
    }

    #[test]
    fn test_compression_toggle_keeps_entries_readable() {
        let dir = tempfile::tempdir().unwrap();
        let compressed = FileCache::open(CacheConfig::new(dir.path()).with_compression(true)).unwrap();
        compressed.set("k", b"payload payload payload", None, &[]).unwrap();

        let plain = FileCache::open(CacheConfig::new(dir.path()).with_compression(false)).unwrap();
        assert_eq!(plain.get("k").unwrap(), b"payload payload payload");
    }
}
