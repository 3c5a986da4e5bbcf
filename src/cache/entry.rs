//! Cache Entry Module
//!
//! Defines the stored entry, its on-disk header and the metadata view.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Entry Header ==
/// Everything stored about an entry except the payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Caller-supplied logical key
    pub key: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// TTL the entry was written with, 0 = never expires
    pub ttl_seconds: u64,
    /// Labels for bulk invalidation
    pub tags: BTreeSet<String>,
    /// Size of the payload in bytes
    pub size_bytes: u64,
    /// CRC-32 of the payload
    pub checksum: u32,
}

impl EntryHeader {
    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal
    /// to its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// True when any of `tags` is carried by this entry.
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }
}

// == Cache Entry ==
/// A single stored unit: payload plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub header: EntryHeader,
    /// Opaque serialized application data
    pub payload: Vec<u8>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `key` - Logical cache key
    /// * `payload` - Bytes to store
    /// * `ttl_seconds` - TTL in seconds, 0 for an entry that never expires
    /// * `tags` - Invalidation labels
    pub fn new<I, S>(key: &str, payload: Vec<u8>, ttl_seconds: u64, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = current_timestamp_ms();
        let expires_at =
            (ttl_seconds > 0).then(|| now.saturating_add(ttl_seconds.saturating_mul(1000)));

        Self {
            header: EntryHeader {
                key: key.to_string(),
                created_at: now,
                expires_at,
                ttl_seconds,
                tags: tags.into_iter().map(Into::into).collect(),
                size_bytes: payload.len() as u64,
                checksum: crc32fast::hash(&payload),
            },
            payload,
        }
    }

    pub fn key(&self) -> &str {
        &self.header.key
    }

    pub fn is_expired(&self) -> bool {
        self.header.is_expired()
    }

    /// True when the stored checksum still matches the payload.
    pub fn checksum_matches(&self) -> bool {
        crc32fast::hash(&self.payload) == self.header.checksum
            && self.payload.len() as u64 == self.header.size_bytes
    }
}

// == Entry Meta ==
/// Timing, size and tag information about an entry, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryMeta {
    pub key: String,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub ttl_seconds: u64,
    pub tags: BTreeSet<String>,
    pub size_bytes: u64,
    /// Seconds since the entry was written
    pub age_seconds: u64,
    /// Seconds until expiry, None when the entry never expires
    pub remaining_ttl_seconds: Option<u64>,
    pub is_expired: bool,
}

impl EntryMeta {
    pub fn from_header(header: &EntryHeader) -> Self {
        let now = current_timestamp_ms();
        Self {
            key: header.key.clone(),
            created_at: header.created_at,
            expires_at: header.expires_at,
            ttl_seconds: header.ttl_seconds,
            tags: header.tags.clone(),
            size_bytes: header.size_bytes,
            age_seconds: now.saturating_sub(header.created_at) / 1000,
            remaining_ttl_seconds: header
                .expires_at
                .map(|expires| expires.saturating_sub(now) / 1000),
            is_expired: header.is_expired_at(now),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
