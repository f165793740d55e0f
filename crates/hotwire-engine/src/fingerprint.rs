//! Content fingerprints
//!
//! Decides whether a file really changed. Editors that touch a file without
//! altering it, and duplicate OS notifications, produce the same fingerprint
//! and are filtered out here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

/// Compute the SHA-256 hex digest of a file's raw bytes
pub fn fingerprint(path: &Path) -> std::io::Result<String> {
    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Per-file fingerprint cache
#[derive(Debug, Default)]
pub struct ContentFingerprinter {
    hashes: HashMap<PathBuf, String>,
}

impl ContentFingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the file content differs from the cached fingerprint.
    ///
    /// The first observation of a path only seeds the cache and reports no
    /// change. An unreadable file drops its cache entry and reports no change.
    pub fn has_file_changed(&mut self, path: &Path) -> bool {
        let current = match fingerprint(path) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(path = ?path, error = %e, "File unreadable, dropping fingerprint");
                self.hashes.remove(path);
                return false;
            }
        };

        match self.hashes.get_mut(path) {
            None => {
                self.hashes.insert(path.to_path_buf(), current);
                false
            }
            Some(cached) if *cached != current => {
                *cached = current;
                true
            }
            Some(_) => false,
        }
    }

    /// Store the current fingerprint without reporting a change.
    /// Returns false when the file could not be read.
    pub fn seed(&mut self, path: &Path) -> bool {
        match fingerprint(path) {
            Ok(hash) => {
                self.hashes.insert(path.to_path_buf(), hash);
                true
            }
            Err(_) => false,
        }
    }

    /// Drop the cached fingerprint; true when one was present
    pub fn forget(&mut self, path: &Path) -> bool {
        self.hashes.remove(path).is_some()
    }

    /// Whether the path has been seen
    pub fn contains(&self, path: &Path) -> bool {
        self.hashes.contains_key(path)
    }

    /// Cached hex digest for the path
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }

    /// Drop entries whose file no longer exists; returns how many were dropped
    pub fn retain_existing(&mut self) -> usize {
        let before = self.hashes.len();
        self.hashes.retain(|path, _| path.is_file());
        before - self.hashes.len()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }
}
