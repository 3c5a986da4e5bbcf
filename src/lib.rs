//! File Cache - a persistent, file-backed cache for dashboard data
//!
//! Each entry lives in its own integrity-checked file. Independent
//! processes share one cache directory safely through atomic writes and
//! per-key lock markers.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheSummary, EntryMeta, FileCache};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
