//! Garbage Collector Module
//!
//! Lazy eviction of entries found expired or corrupted on read, and the
//! explicit sweep over the whole directory.

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::cache::codec::EntryCodec;
use crate::cache::entry::current_timestamp_ms;
use crate::cache::index::Index;
use crate::cache::lock::LockManager;
use crate::cache::store::CacheStore;
use crate::error::CacheError;

// == Sweep Report ==
/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub corrupted: usize,
    pub temp_files: usize,
}

impl SweepReport {
    /// Entries (not temp files) removed.
    pub fn removed(&self) -> usize {
        self.expired + self.corrupted
    }
}

/// Why a file was removed under its lock.
#[derive(Debug)]
enum Reclaimed {
    /// Expired entry and the key its header carried
    Expired(String),
    Corrupted,
}

// == Garbage Collector ==
#[derive(Debug, Clone)]
pub struct GarbageCollector {
    store: CacheStore,
    codec: EntryCodec,
    locks: LockManager,
    index: Index,
    /// 1-in-N chance per write; 0 disables
    probability: u32,
    temp_max_age: Duration,
}

impl GarbageCollector {
    pub fn new(
        store: CacheStore,
        codec: EntryCodec,
        locks: LockManager,
        index: Index,
        probability: u32,
        temp_max_age: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            locks,
            index,
            probability,
            temp_max_age,
        }
    }

    // == Evict ==
    /// Deletes an entry observed as expired or corrupted.
    ///
    /// The entry is re-read under its lock and removed only if it is still
    /// expired or corrupted, so a file replaced by a writer since it was
    /// observed survives. Skipped while a writer holds the lock. `key` is
    /// the key the caller asked for, None when sweeping.
    pub fn evict(&self, path: &Path, key: Option<&str>, reason: &str) -> bool {
        match self.reclaim(path, key) {
            Some(Reclaimed::Expired(stored_key)) => {
                self.index.remove(&stored_key);
                debug!(path = %path.display(), reason, "entry evicted");
                true
            }
            Some(Reclaimed::Corrupted) => {
                if let Some(key) = key {
                    self.index.remove(key);
                }
                debug!(path = %path.display(), reason, "entry evicted");
                true
            }
            None => false,
        }
    }

    /// Removes the file at `path` if, read under its lock, it is expired or
    /// corrupted. A header key other than `expected_key` counts as corrupted.
    fn reclaim(&self, path: &Path, expected_key: Option<&str>) -> Option<Reclaimed> {
        let _guard = match self.locks.try_acquire(path) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!(path = %path.display(), "eviction skipped, entry is being written");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "eviction skipped, lock unavailable");
                return None;
            }
        };

        let outcome = match self.codec.load(&self.store, path) {
            Ok(entry) if expected_key.is_some_and(|key| key != entry.key()) => {
                Reclaimed::Corrupted
            }
            Ok(entry) if entry.header.is_expired_at(current_timestamp_ms()) => {
                Reclaimed::Expired(entry.header.key)
            }
            Ok(_) => {
                debug!(path = %path.display(), "eviction skipped, entry was rewritten");
                return None;
            }
            Err(CacheError::Corrupted(_)) => Reclaimed::Corrupted,
            Err(CacheError::NotFound(_)) => return None,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to re-read entry for eviction");
                return None;
            }
        };

        match self.store.remove(path) {
            Ok(true) => Some(outcome),
            Ok(false) => None,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to evict entry");
                None
            }
        }
    }

    /// Rolls the 1-in-N dice for a write-triggered sweep.
    pub fn is_due(&self) -> bool {
        match self.probability {
            0 => false,
            1 => true,
            n => rand::rng().random_ratio(1, n),
        }
    }

    // == Sweep ==
    /// Opens every entry and removes the expired and corrupted ones, then
    /// clears temporary files abandoned by interrupted writes.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let paths = match self.store.list_entries() {
            Ok(paths) => paths,
            Err(err) => {
                error!(error = %err, "sweep could not list cache directory");
                return report;
            }
        };

        let now = current_timestamp_ms();
        let mut expired_keys = Vec::new();

        for path in paths {
            let candidate = match self.codec.load(&self.store, &path) {
                Ok(entry) => entry.header.is_expired_at(now),
                Err(CacheError::Corrupted(reason)) => {
                    warn!(path = %path.display(), reason = %reason, "sweep found corrupted entry");
                    true
                }
                // Deleted by someone else since the listing
                Err(CacheError::NotFound(_)) => false,
                Err(err) => {
                    error!(path = %path.display(), error = %err, "sweep failed to read entry");
                    false
                }
            };
            if !candidate {
                continue;
            }

            match self.reclaim(&path, None) {
                Some(Reclaimed::Expired(key)) => {
                    report.expired += 1;
                    expired_keys.push(key);
                }
                Some(Reclaimed::Corrupted) => report.corrupted += 1,
                None => {}
            }
        }

        self.index.remove_many(&expired_keys);

        match self.store.remove_orphaned_temp_files(self.temp_max_age) {
            Ok(count) => report.temp_files = count,
            Err(err) => warn!(error = %err, "failed to remove orphaned temp files"),
        }

        if report.removed() > 0 {
            info!(
                "Cache cleanup: removed {} expired and {} corrupted entries",
                report.expired, report.corrupted
            );
        } else {
            debug!("Cache cleanup: no expired entries found");
        }

        report
    }
}
