//! Configuration Module
//!
//! Construction parameters for the cache engine, and the daemon
//! configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

// == Cache Config ==
/// Parameters a [`crate::cache::FileCache`] is opened with.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding entry files, lock markers and the index
    pub cache_dir: PathBuf,
    /// Default TTL in seconds for entries without explicit TTL (0 = never expires)
    pub default_ttl: u64,
    /// Maximum payload size and maximum encoded entry size, in bytes
    pub max_entry_size: usize,
    /// Whether encoded entries are zlib-compressed
    pub compression: bool,
    /// zlib compression level (0-9)
    pub compression_level: u32,
    /// Upper bound on per-key lock acquisition
    pub lock_timeout: Duration,
    /// Sleep between lock acquisition attempts
    pub lock_poll_interval: Duration,
    /// Age after which a lock marker is considered abandoned
    pub lock_stale_after: Duration,
    /// 1-in-N chance that a successful set triggers a sweep; 0 disables
    pub gc_probability: u32,
}

impl CacheConfig {
    /// Creates a config rooted at `cache_dir` with default settings.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl = secs;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    pub fn with_lock_stale_after(mut self, age: Duration) -> Self {
        self.lock_stale_after = age;
        self
    }

    pub fn with_gc_probability(mut self, one_in: u32) -> Self {
        self.gc_probability = one_in;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            default_ttl: 3600,
            max_entry_size: 5 * 1024 * 1024,
            compression: true,
            compression_level: 6,
            lock_timeout: Duration::from_secs(5),
            lock_poll_interval: Duration::from_millis(100),
            lock_stale_after: Duration::from_secs(30),
            gc_probability: 100,
        }
    }
}

// == Daemon Config ==
/// Maintenance daemon configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache root directory
    pub cache_dir: PathBuf,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Maximum entry size in bytes
    pub max_entry_size: usize,
    /// Whether entries are compressed on disk
    pub compression: bool,
    /// Lock acquisition timeout in milliseconds
    pub lock_timeout_ms: u64,
    /// Lock poll interval in milliseconds
    pub lock_poll_ms: u64,
    /// Lock staleness threshold in seconds
    pub lock_stale_secs: u64,
    /// 1-in-N sweep probability on set
    pub gc_probability: u32,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory (default: ./cache)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `MAX_ENTRY_SIZE` - Maximum entry size in bytes (default: 5 MiB)
    /// - `CACHE_COMPRESSION` - `true`/`false` (default: true)
    /// - `LOCK_TIMEOUT_MS` - Lock acquisition timeout (default: 5000)
    /// - `LOCK_POLL_MS` - Lock poll interval (default: 100)
    /// - `LOCK_STALE_SECS` - Lock staleness threshold (default: 30)
    /// - `GC_PROBABILITY` - 1-in-N sweep chance on set, 0 disables (default: 100)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds, 0 is ignored (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            max_entry_size: parse_var("MAX_ENTRY_SIZE").unwrap_or(defaults.max_entry_size),
            compression: parse_var("CACHE_COMPRESSION").unwrap_or(defaults.compression),
            lock_timeout_ms: parse_var("LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout_ms),
            lock_poll_ms: parse_var("LOCK_POLL_MS").unwrap_or(defaults.lock_poll_ms),
            lock_stale_secs: parse_var("LOCK_STALE_SECS").unwrap_or(defaults.lock_stale_secs),
            gc_probability: parse_var("GC_PROBABILITY").unwrap_or(defaults.gc_probability),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL")
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    /// Builds the engine configuration from the daemon settings.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_dir.clone())
            .with_default_ttl(self.default_ttl)
            .with_max_entry_size(self.max_entry_size)
            .with_compression(self.compression)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_lock_poll_interval(Duration::from_millis(self.lock_poll_ms))
            .with_lock_stale_after(Duration::from_secs(self.lock_stale_secs))
            .with_gc_probability(self.gc_probability)
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            cache_dir: cache.cache_dir,
            default_ttl: cache.default_ttl,
            max_entry_size: cache.max_entry_size,
            compression: cache.compression,
            lock_timeout_ms: cache.lock_timeout.as_millis() as u64,
            lock_poll_ms: cache.lock_poll_interval.as_millis() as u64,
            lock_stale_secs: cache.lock_stale_after.as_secs(),
            gc_probability: cache.gc_probability,
            server_port: 3000,
            cleanup_interval: 60,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.max_entry_size, 5 * 1024 * 1024);
        assert!(config.compression);
        assert_eq!(config.lock_timeout_ms, 5000);
        assert_eq!(config.lock_poll_ms, 100);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_DIR",
            "DEFAULT_TTL",
            "MAX_ENTRY_SIZE",
            "CACHE_COMPRESSION",
            "LOCK_TIMEOUT_MS",
            "LOCK_POLL_MS",
            "LOCK_STALE_SECS",
            "GC_PROBABILITY",
            "SERVER_PORT",
            "CLEANUP_INTERVAL",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.gc_probability, 100);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_zero_cleanup_interval_falls_back_to_default() {
        env::set_var("CLEANUP_INTERVAL", "0");
        let config = Config::from_env();
        env::remove_var("CLEANUP_INTERVAL");

        assert_eq!(config.cleanup_interval, 60);
    }

    #[test]
    fn test_cache_config_from_daemon_config() {
        let config = Config {
            lock_timeout_ms: 250,
            lock_poll_ms: 5,
            compression: false,
            ..Config::default()
        };

        let cache = config.cache_config();
        assert_eq!(cache.lock_timeout, Duration::from_millis(250));
        assert_eq!(cache.lock_poll_interval, Duration::from_millis(5));
        assert!(!cache.compression);
        assert_eq!(cache.default_ttl, 3600);
    }

    #[test]
    fn test_compression_level_is_clamped() {
        let cache = CacheConfig::new("/tmp/x").with_compression_level(42);
        assert_eq!(cache.compression_level, 9);
    }
}
