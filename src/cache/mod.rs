//! Cache Module
//!
//! Provides a persistent, file-backed cache with TTL expiration, tag
//! invalidation and cross-process write locking.

mod codec;
mod entry;
mod facade;
mod gc;
mod index;
mod key;
mod lock;
mod store;
mod summary;


// Re-export public types
pub use codec::EntryCodec;
pub use entry::{current_timestamp_ms, CacheEntry, EntryHeader, EntryMeta};
pub use facade::FileCache;
pub use gc::{GarbageCollector, SweepReport};
pub use index::{Index, IndexMap, IndexRecord};
pub use key::KeyCodec;
pub use lock::{LockGuard, LockManager};
pub use store::CacheStore;
pub use summary::CacheSummary;

// == Public Constants ==
/// Extension of entry files
pub const ENTRY_EXTENSION: &str = "cache";

/// Appended to a file name to form its lock marker
pub const LOCK_SUFFIX: &str = ".lock";

/// Suffix of in-flight temporary files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Secondary index file at the cache root
pub const INDEX_FILE_NAME: &str = "cache_index.json";

/// Web server deny rule written at the cache root
pub const ACCESS_CONTROL_FILE: &str = ".htaccess";
