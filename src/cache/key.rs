//! Key Codec Module
//!
//! Maps arbitrary cache keys to safe, collision-resistant file names.

use sha2::{Digest, Sha256};

use crate::cache::ENTRY_EXTENSION;

/// Longest sanitized prefix kept in a file name.
const MAX_PREFIX_CHARS: usize = 64;

/// Number of SHA-256 bytes mixed into the file name.
const DIGEST_BYTES: usize = 16;

// == Key Codec ==
/// Derives `<sanitized-prefix>_<digest>.cache` names from keys.
///
/// The prefix only exists to make the directory readable by humans; the
/// digest of the raw key is what keeps two keys apart.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec;

impl KeyCodec {
    /// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
    pub fn sanitize(key: &str) -> String {
        key.chars()
            .take(MAX_PREFIX_CHARS)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Hex digest of the raw key bytes.
    pub fn digest(key: &str) -> String {
        let hash = Sha256::digest(key.as_bytes());
        hex::encode(&hash[..DIGEST_BYTES])
    }

    /// File name (no directory) for the given key.
    pub fn file_name(key: &str) -> String {
        format!(
            "{}_{}.{}",
            Self::sanitize(key),
            Self::digest(key),
            ENTRY_EXTENSION
        )
    }
}
