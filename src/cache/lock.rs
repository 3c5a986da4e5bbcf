//! Lock Manager Module
//!
//! Advisory per-entry write locks built on atomic file creation.
//!
//! A lock is a `<entry-file>.lock` marker created with `create_new`, so at
//! most one process can hold it. The marker records its creation time; a
//! marker older than the staleness threshold is treated as left behind by
//! a crashed holder and reclaimed.
//!
//! Reclaiming is itself guarded by a `<entry-file>.lock.reclaim` marker.
//! The reclaimer re-reads the stale marker while holding that guard, so
//! a marker that another reclaimer has just replaced with its own live
//! lock is never removed.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::LOCK_SUFFIX;
use crate::error::{CacheError, Result};

const RECLAIM_SUFFIX: &str = ".reclaim";

// == Lock Manager ==
#[derive(Debug, Clone)]
pub struct LockManager {
    timeout: Duration,
    poll_interval: Duration,
    stale_after: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration, poll_interval: Duration, stale_after: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            stale_after,
        }
    }

    /// Marker path guarding `target`.
    pub fn lock_path(target: &Path) -> PathBuf {
        with_suffix(target, LOCK_SUFFIX)
    }

    // == Acquire ==
    /// Polls until the lock for `target` is held or the timeout elapses.
    ///
    /// Never returns without the lock: elapsing the timeout is
    /// [`CacheError::LockTimeout`], any other failure is [`CacheError::Io`].
    pub fn acquire(&self, target: &Path) -> Result<LockGuard> {
        let lock_path = Self::lock_path(target);
        let deadline = Instant::now() + self.timeout;

        loop {
            match create_marker(&lock_path) {
                Ok(guard) => return Ok(guard),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if self.reclaim_if_stale(&lock_path) {
                        continue;
                    }

                    if Instant::now() >= deadline {
                        warn!(lock = %lock_path.display(), "lock acquisition timed out");
                        return Err(CacheError::LockTimeout(lock_path.display().to_string()));
                    }

                    thread::sleep(self.poll_interval);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Takes the lock for `target` without waiting.
    ///
    /// `None` when a live holder has it. A stale marker is reclaimed first.
    pub fn try_acquire(&self, target: &Path) -> Result<Option<LockGuard>> {
        let lock_path = Self::lock_path(target);

        // Second attempt only after a successful reclaim
        for _ in 0..2 {
            match create_marker(&lock_path) {
                Ok(guard) => return Ok(Some(guard)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if !self.reclaim_if_stale(&lock_path) {
                        return Ok(None);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    // == Release ==
    /// Removes the marker for `target`. Removing an absent marker is not an error.
    pub fn release(target: &Path) -> Result<()> {
        remove_marker(&Self::lock_path(target))
    }

    // == Stale Reclaim ==
    /// Removes the marker when it is older than the staleness threshold.
    ///
    /// Returns true when the caller should retry creating the marker.
    fn reclaim_if_stale(&self, lock_path: &Path) -> bool {
        match marker_age(lock_path) {
            None => return true,
            Some(age) if age <= self.stale_after => return false,
            Some(_) => {}
        }

        let Some(_reclaiming) = self.reclaim_guard(lock_path) else {
            return false;
        };

        // Another reclaimer may have replaced the marker before we got the guard
        match marker_age(lock_path) {
            None => true,
            Some(age) if age > self.stale_after => {
                warn!(
                    lock = %lock_path.display(),
                    age_ms = age.as_millis() as u64,
                    "reclaiming stale lock"
                );
                remove_marker(lock_path).is_ok()
            }
            Some(_) => false,
        }
    }

    /// Exclusive right to reclaim `lock_path`, if no one else is reclaiming it.
    fn reclaim_guard(&self, lock_path: &Path) -> Option<LockGuard> {
        let guard_path = with_suffix(lock_path, RECLAIM_SUFFIX);
        match create_marker(&guard_path) {
            Ok(guard) => Some(guard),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // A reclaimer that died mid-reclaim leaves its guard behind
                if marker_age(&guard_path).is_some_and(|age| age > self.stale_after) {
                    warn!(guard = %guard_path.display(), "removing abandoned reclaim guard");
                    let _ = remove_marker(&guard_path);
                }
                None
            }
            Err(err) => {
                warn!(
                    guard = %guard_path.display(),
                    error = %err,
                    "failed to create reclaim guard"
                );
                None
            }
        }
    }
}

// == Lock Guard ==
/// Holds a lock until dropped or explicitly released.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_marker(&self.path)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = remove_marker(&self.path) {
                warn!(lock = %self.path.display(), error = %err, "failed to release lock");
            }
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Creates `path` exclusively and stamps it with the time and pid.
fn create_marker(path: &Path) -> io::Result<LockGuard> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    // The stamp is advisory; an unwritten marker falls back to mtime.
    let _ = write!(file, "{} {}", current_timestamp_ms(), std::process::id());
    Ok(LockGuard {
        path: path.to_path_buf(),
        released: false,
    })
}

fn remove_marker(lock_path: &Path) -> Result<()> {
    match fs::remove_file(lock_path) {
        Ok(()) => {
            debug!(lock = %lock_path.display(), "lock released");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Age from the stamp written into the marker, falling back to its mtime.
fn marker_age(lock_path: &Path) -> Option<Duration> {
    let stamped = fs::read_to_string(lock_path).ok().and_then(|content| {
        content
            .split_whitespace()
            .next()
            .and_then(|ms| ms.parse::<u64>().ok())
    });

    match stamped {
        Some(created_ms) => Some(Duration::from_millis(
            current_timestamp_ms().saturating_sub(created_ms),
        )),
        None => fs::metadata(lock_path)
            .ok()?
            .modified()
            .ok()
            .and_then(|time| SystemTime::now().duration_since(time).ok()),
    }
}
