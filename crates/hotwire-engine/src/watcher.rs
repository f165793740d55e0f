//! File system watcher
//!
//! Bridges the OS notification thread into the engine's event loop. The
//! notify callback only converts and forwards events; it never touches the
//! loader or the graph.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ConfigResult};

/// Watch event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Removed,
    /// Moved from `from` to the event's path
    Renamed { from: PathBuf },
}

/// Watch event
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
    pub timestamp: Instant,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            timestamp: Instant::now(),
        }
    }
}

/// Watch and ignore globs, matched against paths relative to the root
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    watch: GlobSet,
    ignore: GlobSet,
}

impl WatchFilter {
    pub fn new(root: &Path, watch: &[String], ignore: &[String]) -> ConfigResult<Self> {
        Ok(Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            watch: build_globset(watch)?,
            ignore: build_globset(ignore)?,
        })
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        let parent = path.parent()?.canonicalize().ok()?;
        parent
            .join(path.file_name()?)
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.relative(path)
            .is_some_and(|rel| self.watch.is_match(&rel))
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.relative(path)
            .is_some_and(|rel| self.ignore.is_match(&rel))
    }

    /// Matches a watch pattern, no ignore pattern, and is not a directory
    pub fn should_watch(&self, path: &Path) -> bool {
        !path.is_dir() && self.matches(path) && !self.is_ignored(path)
    }
}

fn build_globset(patterns: &[String]) -> ConfigResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ConfigError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Rename halves carried between [`convert_event`] calls.
///
/// inotify reports one rename as `From`, `To` and then `Both`; the `Both`
/// that repeats an already paired rename is dropped.
#[derive(Debug, Default)]
pub struct RenameTracker {
    pending_from: Option<PathBuf>,
    last_paired: Option<(PathBuf, PathBuf)>,
}

/// Convert a raw notify event
pub fn convert_event(event: Event, renames: &mut RenameTracker) -> Vec<WatchEvent> {
    let mut paths = event.paths.into_iter();

    match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => paths
            .map(|p| WatchEvent::new(WatchEventKind::Created, p))
            .collect(),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Metadata(_)) => paths
            .map(|p| WatchEvent::new(WatchEventKind::Modified, p))
            .collect(),
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => paths
            .map(|p| WatchEvent::new(WatchEventKind::Removed, p))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            renames.pending_from = paths.next();
            renames.last_paired = None;
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => paths
            .map(|p| match renames.pending_from.take() {
                Some(from) => {
                    renames.last_paired = Some((from.clone(), p.clone()));
                    WatchEvent::new(WatchEventKind::Renamed { from }, p)
                }
                None => WatchEvent::new(WatchEventKind::Created, p),
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => {
                    let already_paired = renames
                        .last_paired
                        .take()
                        .is_some_and(|(f, t)| f == from && t == to);
                    if already_paired {
                        Vec::new()
                    } else {
                        vec![WatchEvent::new(WatchEventKind::Renamed { from }, to)]
                    }
                }
                _ => Vec::new(),
            }
        }
        // Platforms that cannot tell the two halves apart
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .map(|p| {
                let kind = if p.exists() {
                    WatchEventKind::Created
                } else {
                    WatchEventKind::Removed
                };
                WatchEvent::new(kind, p)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Recursive watcher over the managed root
pub struct SourceWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    shutdown_timeout: Duration,
}

impl SourceWatcher {
    pub fn new(root: impl Into<PathBuf>, shutdown_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            watcher: None,
            shutdown_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Start forwarding converted events into `tx`
    pub fn start(&mut self, tx: mpsc::Sender<WatchEvent>) -> Result<(), notify::Error> {
        info!(root = ?self.root, "Starting source watcher");

        let mut renames = RenameTracker::default();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    for watch_event in convert_event(event, &mut renames) {
                        if tx.blocking_send(watch_event).is_err() {
                            debug!("Event loop gone, dropping watch event");
                            return;
                        }
                    }
                }
                Err(e) => error!("File watcher error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Release the OS watch handle, waiting at most `shutdown_timeout`
    pub async fn stop(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        info!(root = ?self.root, "Stopping source watcher");

        let release = tokio::task::spawn_blocking(move || drop(watcher));
        match tokio::time::timeout(self.shutdown_timeout, release).await {
            Ok(Ok(())) => debug!("Source watcher released"),
            Ok(Err(e)) => warn!(error = %e, "Source watcher release panicked"),
            Err(_) => warn!(
                timeout = ?self.shutdown_timeout,
                "Timed out releasing source watcher"
            ),
        }
    }
}
