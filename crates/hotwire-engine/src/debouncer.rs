//! Change debouncer
//!
//! Each path is either idle or has exactly one pending timer. A qualifying
//! change (re)starts the path's timer, so a burst of writes fires once,
//! `delay` after the last write. Timers post back to the event loop through
//! a channel; a fire is only honoured if it still carries the path's current
//! generation, which rules out a superseded timer that raced its abort.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::watcher::WatchFilter;

/// A timer that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredChange {
    pub path: PathBuf,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    /// Path filtered out (pattern mismatch, ignored, directory)
    Ignored,
    /// Content fingerprint did not change
    Unchanged,
    /// Timer started; `replaced` is true when a pending timer was cancelled
    Scheduled { replaced: bool },
}

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct ChangeDebouncer {
    delay: Duration,
    filter: WatchFilter,
    pending: HashMap<PathBuf, PendingTimer>,
    next_generation: u64,
    fired_tx: mpsc::UnboundedSender<FiredChange>,
    gauge: Arc<AtomicUsize>,
}

impl ChangeDebouncer {
    pub fn new(delay: Duration, filter: WatchFilter) -> (Self, mpsc::UnboundedReceiver<FiredChange>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            filter,
            pending: HashMap::new(),
            next_generation: 0,
            fired_tx,
            gauge: Arc::new(AtomicUsize::new(0)),
        };
        (debouncer, fired_rx)
    }

    /// Shared counter of pending timers, readable from outside the event loop
    pub fn pending_gauge(&self) -> Arc<AtomicUsize> {
        self.gauge.clone()
    }

    /// Handle a "modified" event. Must run inside a tokio runtime.
    pub fn on_modified(
        &mut self,
        path: &Path,
        has_changed: impl FnOnce(&Path) -> bool,
    ) -> DebounceDecision {
        if !self.filter.should_watch(path) {
            return DebounceDecision::Ignored;
        }
        if !has_changed(path) {
            debug!(path = ?path, "Content unchanged, dropping event");
            return DebounceDecision::Unchanged;
        }

        let replaced = self.cancel(path);

        self.next_generation += 1;
        let generation = self.next_generation;
        let delay = self.delay;
        let tx = self.fired_tx.clone();
        let fired_path = path.to_path_buf();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(FiredChange {
                path: fired_path,
                generation,
            });
        });

        self.pending
            .insert(path.to_path_buf(), PendingTimer { generation, handle });
        self.sync_gauge();

        debug!(path = ?path, replaced, "Debounce timer scheduled");
        DebounceDecision::Scheduled { replaced }
    }

    /// Claim a fired timer. False when it was superseded or cancelled.
    pub fn accept(&mut self, fired: &FiredChange) -> bool {
        let current = self
            .pending
            .get(&fired.path)
            .is_some_and(|timer| timer.generation == fired.generation);
        if current {
            self.pending.remove(&fired.path);
            self.sync_gauge();
        }
        current
    }

    pub fn cancel(&mut self, path: &Path) -> bool {
        let cancelled = match self.pending.remove(path) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        };
        self.sync_gauge();
        cancelled
    }

    /// Cancel every pending timer; returns how many were cancelled
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, timer) in self.pending.drain() {
            timer.handle.abort();
        }
        self.sync_gauge();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }

    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    fn sync_gauge(&self) {
        self.gauge.store(self.pending.len(), Ordering::Relaxed);
    }
}

impl Drop for ChangeDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
