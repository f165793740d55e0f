use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A package tree on disk: `<tempdir>/<namespace>/...`.
///
/// The directory is removed when the fixture is dropped.
pub struct SourceTree {
    _dir: TempDir,
    root: PathBuf,
}

impl SourceTree {
    /// # Panics
    /// Panics when the temporary directory cannot be created.
    pub fn new(namespace: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join(namespace);
        std::fs::create_dir_all(&root).expect("create package root");
        Self { _dir: dir, root }
    }

    /// Builder form of [`write`](Self::write)
    pub fn file(self, relative: &str, contents: &str) -> Self {
        self.write(relative, contents);
        self
    }

    /// Write a file relative to the root, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, contents).expect("write source file");
        path
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.root.join(relative)).expect("remove source file");
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}
