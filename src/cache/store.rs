//! Cache Store Module
//!
//! Durable key to file mapping with rename-based atomic writes.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::cache::key::KeyCodec;
use crate::cache::{ENTRY_EXTENSION, TEMP_SUFFIX};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// File-level operations over the cache root directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    // == Constructor ==
    /// Opens the store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry file path for a key.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(KeyCodec::file_name(key))
    }

    // == Write ==
    /// Writes `bytes` to `path` through a temporary sibling and a rename.
    ///
    /// Readers see either the previous file or the new one in full. On
    /// failure the temporary file is removed and `path` is left untouched.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let prefix = format!(
            ".{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        // A failed persist hands the temp file back; dropping it deletes it.
        tmp.persist(path).map_err(|err| CacheError::Io(err.error))?;
        debug!(path = %path.display(), bytes = bytes.len(), "entry written");
        Ok(())
    }

    // == Read ==
    /// Reads a whole file, refusing anything larger than `limit` bytes.
    pub fn read(&self, path: &Path, limit: usize) -> Result<Vec<u8>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound(path.display().to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut bytes = Vec::new();
        file.take(limit as u64 + 1).read_to_end(&mut bytes)?;
        if bytes.len() > limit {
            return Err(CacheError::Corrupted(format!(
                "file larger than {limit} bytes"
            )));
        }
        Ok(bytes)
    }

    // == Remove ==
    /// Deletes a file. Returns whether a file was actually removed; a
    /// missing file is success.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn file_size(&self, path: &Path) -> u64 {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }

    // == List Entries ==
    /// All entry files currently in the directory.
    pub fn list_entries(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let path = match dirent {
                Ok(dirent) => dirent.path(),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && path.is_file();
            if is_entry {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Removes temporary files older than `max_age` left by interrupted writes.
    pub fn remove_orphaned_temp_files(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for dirent in fs::read_dir(&self.root)?.flatten() {
            let path = dirent.path();
            let is_temp = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(TEMP_SUFFIX))
                .unwrap_or(false);
            if !is_temp {
                continue;
            }

            let old_enough = dirent
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .is_some_and(|age| age > max_age);
            if old_enough && self.remove(&path)? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}
