//! Entry Codec Module
//!
//! Serializes entries into a single integrity-checked blob.
//!
//! Layout: `FCE1` magic, one flag byte, then the body. The body is a
//! big-endian `u32` header length, the JSON header and the raw payload,
//! zlib-compressed as a whole when the compressed flag is set.

use std::io::{Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::cache::entry::{CacheEntry, EntryHeader};
use crate::cache::store::CacheStore;
use crate::error::{CacheError, Result};

const MAGIC: &[u8; 4] = b"FCE1";
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const PREAMBLE_LEN: usize = MAGIC.len() + 1;

/// Header bytes tolerated on top of the size limit when reading or inflating.
/// Writes never use it: an encoded blob must fit in the limit itself.
const HEADER_ALLOWANCE: usize = 64 * 1024;

// == Entry Codec ==
#[derive(Debug, Clone)]
pub struct EntryCodec {
    compression: bool,
    level: u32,
    max_size: usize,
}

impl EntryCodec {
    pub fn new(compression: bool, level: u32, max_size: usize) -> Self {
        Self {
            compression,
            level: level.min(9),
            max_size,
        }
    }

    /// Largest file this codec will accept from disk.
    pub fn max_blob_size(&self) -> usize {
        self.max_size.saturating_add(HEADER_ALLOWANCE)
    }

    // == Encode ==
    /// Encodes an entry, refusing a payload or an encoded blob above the
    /// configured maximum.
    pub fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        if entry.payload.len() > self.max_size {
            return Err(CacheError::CapacityExceeded {
                size: entry.payload.len(),
                max: self.max_size,
            });
        }

        let header = serde_json::to_vec(&entry.header)
            .map_err(|e| CacheError::Internal(format!("header serialization failed: {e}")))?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| CacheError::Internal("header too large".to_string()))?;

        let mut body = Vec::with_capacity(4 + header.len() + entry.payload.len());
        body.extend_from_slice(&header_len.to_be_bytes());
        body.extend_from_slice(&header);
        body.extend_from_slice(&entry.payload);

        let mut blob = Vec::with_capacity(PREAMBLE_LEN + body.len());
        blob.extend_from_slice(MAGIC);
        if self.compression {
            blob.push(FLAG_COMPRESSED);
            let mut encoder = ZlibEncoder::new(blob, Compression::new(self.level));
            encoder.write_all(&body)?;
            blob = encoder.finish()?;
        } else {
            blob.push(0);
            blob.extend_from_slice(&body);
        }

        if blob.len() > self.max_size {
            return Err(CacheError::CapacityExceeded {
                size: blob.len(),
                max: self.max_size,
            });
        }

        Ok(blob)
    }

    // == Decode ==
    /// Decodes a blob; any structural or checksum problem is `Corrupted`.
    pub fn decode(&self, blob: &[u8]) -> Result<CacheEntry> {
        if blob.len() < PREAMBLE_LEN || &blob[..MAGIC.len()] != MAGIC {
            return Err(corrupted("bad magic"));
        }

        let flags = blob[MAGIC.len()];
        let raw = &blob[PREAMBLE_LEN..];
        let inflated;
        let body: &[u8] = if flags & FLAG_COMPRESSED != 0 {
            inflated = self.inflate(raw)?;
            &inflated
        } else {
            raw
        };

        if body.len() < 4 {
            return Err(corrupted("truncated header length"));
        }
        let header_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        let rest = &body[4..];
        if rest.len() < header_len {
            return Err(corrupted("truncated header"));
        }

        let header: EntryHeader = serde_json::from_slice(&rest[..header_len])
            .map_err(|e| corrupted(&format!("unreadable header: {e}")))?;
        let entry = CacheEntry {
            header,
            payload: rest[header_len..].to_vec(),
        };

        if !entry.checksum_matches() {
            return Err(corrupted("checksum mismatch"));
        }

        Ok(entry)
    }

    /// Reads and decodes the entry file at `path`.
    pub fn load(&self, store: &CacheStore, path: &Path) -> Result<CacheEntry> {
        let blob = store.read(path, self.max_blob_size())?;
        self.decode(&blob)
    }

    fn inflate(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let limit = self.max_blob_size() as u64;
        let mut out = Vec::new();
        ZlibDecoder::new(raw)
            .take(limit + 1)
            .read_to_end(&mut out)
            .map_err(|e| corrupted(&format!("decompression failed: {e}")))?;
        if out.len() as u64 > limit {
            return Err(corrupted("inflated entry exceeds maximum size"));
        }
        Ok(out)
    }
}

fn corrupted(reason: &str) -> CacheError {
    CacheError::Corrupted(reason.to_string())
}
