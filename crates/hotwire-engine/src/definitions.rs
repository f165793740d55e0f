//! Top-level definition tracking
//!
//! Keeps one snapshot per file of its top-level classes and functions and
//! diffs successive snapshots. A diff that only touches existing bodies is
//! a candidate for in-place patching instead of a full reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::syntax::{DefinitionKind, SourceParser};

/// Difference between two definition snapshots of a file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl DefinitionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Only existing definitions changed, none appeared or disappeared
    pub fn is_body_only(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.modified.is_empty()
    }
}

type Snapshot = HashMap<String, (DefinitionKind, String)>;

#[derive(Debug, Default)]
pub struct DefinitionTracker {
    snapshots: HashMap<PathBuf, Snapshot>,
}

impl DefinitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescan `path` and diff against the previous snapshot.
    ///
    /// Returns `None` on the first scan of a file and when the file cannot
    /// be parsed; the previous snapshot is kept in the latter case.
    pub fn track(&mut self, parser: &mut SourceParser, path: &Path) -> Option<DefinitionDiff> {
        let source = std::fs::read_to_string(path).ok()?;
        let definitions = match parser.definitions(&source) {
            Ok(defs) => defs,
            Err(e) => {
                debug!(path = ?path, error = %e, "Skipping definition scan");
                return None;
            }
        };

        let current: Snapshot = definitions
            .into_iter()
            .map(|def| (def.name, (def.kind, digest(&def.text))))
            .collect();

        let previous = self.snapshots.insert(path.to_path_buf(), current);
        let previous = previous?;
        let current = self.snapshots.get(path)?;

        Some(diff(&previous, current))
    }

    pub fn forget(&mut self, path: &Path) -> bool {
        self.snapshots.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

fn digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn diff(previous: &Snapshot, current: &Snapshot) -> DefinitionDiff {
    let mut result = DefinitionDiff::default();

    for (name, (kind, hash)) in current {
        match previous.get(name) {
            None => result.added.push(name.clone()),
            // a class that became a function is a different definition
            Some((old_kind, _)) if old_kind != kind => {
                result.removed.push(name.clone());
                result.added.push(name.clone());
            }
            Some((_, old_hash)) if old_hash != hash => result.modified.push(name.clone()),
            Some(_) => {}
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            result.removed.push(name.clone());
        }
    }

    result.added.sort();
    result.removed.sort();
    result.modified.sort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(initial: &str) -> (tempfile::TempDir, PathBuf, SourceParser, DefinitionTracker) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.py");
        std::fs::write(&path, initial).unwrap();
        let mut parser = SourceParser::new().unwrap();
        let mut tracker = DefinitionTracker::new();
        assert!(tracker.track(&mut parser, &path).is_none());
        (dir, path, parser, tracker)
    }

    #[test]
    fn body_change_is_patchable() {
        let (_dir, path, mut parser, mut tracker) =
            setup("def ping():\n    return 1\n\nclass Admin:\n    pass\n");

        std::fs::write(&path, "def ping():\n    return 2\n\nclass Admin:\n    pass\n").unwrap();
        let diff = tracker.track(&mut parser, &path).unwrap();

        assert_eq!(diff.modified, vec!["ping".to_string()]);
        assert!(diff.is_body_only());
    }

    #[test]
    fn added_and_removed_definitions() {
        let (_dir, path, mut parser, mut tracker) = setup("def a():\n    pass\n");

        std::fs::write(&path, "def b():\n    pass\n\nclass C:\n    pass\n").unwrap();
        let diff = tracker.track(&mut parser, &path).unwrap();

        assert_eq!(diff.added, vec!["C".to_string(), "b".to_string()]);
        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert!(!diff.is_body_only());
    }

    #[test]
    fn kind_change_is_not_body_only() {
        let (_dir, path, mut parser, mut tracker) = setup("def Thing():\n    pass\n");

        std::fs::write(&path, "class Thing:\n    pass\n").unwrap();
        let diff = tracker.track(&mut parser, &path).unwrap();

        assert_eq!(diff.added, vec!["Thing".to_string()]);
        assert_eq!(diff.removed, vec!["Thing".to_string()]);
        assert!(!diff.is_body_only());
    }

    #[test]
    fn unparseable_file_keeps_previous_snapshot() {
        let (_dir, path, mut parser, mut tracker) = setup("def a():\n    return 1\n");

        std::fs::write(&path, "def a(:\n").unwrap();
        assert!(tracker.track(&mut parser, &path).is_none());

        std::fs::write(&path, "def a():\n    return 1\n").unwrap();
        let diff = tracker.track(&mut parser, &path).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn forget_resets_to_first_scan() {
        let (_dir, path, mut parser, mut tracker) = setup("def a():\n    pass\n");
        assert!(tracker.forget(&path));
        assert!(tracker.is_empty());
        assert!(tracker.track(&mut parser, &path).is_none());
        assert_eq!(tracker.len(), 1);
    }
}
