//! Cache Summary Module
//!
//! Aggregate accounting over every entry file in the cache directory.

use serde::Serialize;

// == Cache Summary ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheSummary {
    /// Entry files present in the directory
    pub total_entries: usize,
    /// Entries that decode cleanly and have not expired
    pub valid_entries: usize,
    /// Entries past their expiry but not yet removed
    pub expired_entries: usize,
    /// Entries that failed to decode or verify
    pub corrupted_entries: usize,
    /// Sum of entry file sizes on disk
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub cache_directory: String,
}

impl CacheSummary {
    pub fn new(cache_directory: impl Into<String>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            ..Self::default()
        }
    }

    pub fn record_valid(&mut self, file_size: u64) {
        self.total_entries += 1;
        self.valid_entries += 1;
        self.add_size(file_size);
    }

    pub fn record_expired(&mut self, file_size: u64) {
        self.total_entries += 1;
        self.expired_entries += 1;
        self.add_size(file_size);
    }

    pub fn record_corrupted(&mut self, file_size: u64) {
        self.total_entries += 1;
        self.corrupted_entries += 1;
        self.add_size(file_size);
    }

    fn add_size(&mut self, file_size: u64) {
        self.total_size_bytes += file_size;
        let mb = self.total_size_bytes as f64 / 1024.0 / 1024.0;
        self.total_size_mb = (mb * 100.0).round() / 100.0;
    }
}
