//! Hot-reload manager
//!
//! Owns the watcher and the event loop. The loop is the engine's single
//! execution context: watch events, debounce timers and every loader call
//! are serialized through it.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use error_stack::{Report, ResultExt};
use hotwire_kernel::{HotReloadError, HotReloadResult, ReloadEvent};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debouncer::{ChangeDebouncer, DebounceDecision, FiredChange};
use crate::orchestrator::{DependencyReport, EngineStats, ReloadOrchestrator};
use crate::watcher::{SourceWatcher, WatchEvent, WatchEventKind};

struct Running {
    watcher: SourceWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct HotReloadManager {
    orchestrator: Arc<ReloadOrchestrator>,
    running: Mutex<Option<Running>>,
    pending_timers: Mutex<Option<Arc<AtomicUsize>>>,
}

impl HotReloadManager {
    pub fn new(orchestrator: ReloadOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            running: Mutex::new(None),
            pending_timers: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Arc<ReloadOrchestrator> {
        &self.orchestrator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.orchestrator.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Seed the graph from the loaded extensions and start watching
    pub async fn start(&self) -> HotReloadResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Report::new(HotReloadError::Internal(
                "Already running".to_string(),
            )));
        }

        let config = self.orchestrator.config();
        let root = self.orchestrator.resolver().root().to_path_buf();
        info!(root = ?root, "Starting hot-reload manager");

        self.orchestrator.initialize().await;

        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut watcher = SourceWatcher::new(root.clone(), config.shutdown_timeout);
        if let Err(e) = watcher.start(event_tx) {
            self.orchestrator.teardown();
            return Err::<(), _>(Report::new(HotReloadError::Watch(e.to_string())))
                .attach(format!("root: {}", root.display()));
        }

        let (debouncer, fired_rx) =
            ChangeDebouncer::new(config.debounce, self.orchestrator.filter().clone());
        *self.pending_timers.lock().await = Some(debouncer.pending_gauge());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(event_loop(
            self.orchestrator.clone(),
            debouncer,
            event_rx,
            fired_rx,
            cancel.clone(),
        ));

        *running = Some(Running {
            watcher,
            cancel,
            task,
        });
        info!("Hot-reload manager started");
        Ok(())
    }

    /// Cancel pending timers and the event loop, release the OS watch and
    /// clear every cache. Timing out on the watch release is only logged.
    pub async fn stop(&self) -> HotReloadResult<()> {
        let Some(mut running) = self.running.lock().await.take() else {
            debug!("Hot-reload manager not running");
            return Ok(());
        };
        info!("Stopping hot-reload manager");

        running.cancel.cancel();
        running.task.abort();
        match running.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "Event loop ended abnormally"),
        }

        running.watcher.stop().await;
        self.orchestrator.teardown();
        *self.pending_timers.lock().await = None;

        info!("Hot-reload manager stopped");
        Ok(())
    }

    pub async fn stats(&self) -> EngineStats {
        let mut stats = self.orchestrator.stats();
        if let Some(gauge) = self.pending_timers.lock().await.as_ref() {
            stats.pending_timers = gauge.load(Ordering::Relaxed);
        }
        stats
    }

    pub async fn debug_dependencies(&self, module: &str) -> DependencyReport {
        self.orchestrator.debug_dependencies(module).await
    }
}

async fn event_loop(
    orchestrator: Arc<ReloadOrchestrator>,
    mut debouncer: ChangeDebouncer,
    mut events: mpsc::Receiver<WatchEvent>,
    mut fired: mpsc::UnboundedReceiver<FiredChange>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let cancelled = debouncer.cancel_all();
                debug!(cancelled, "Event loop shutting down");
                return;
            }
            Some(event) = events.recv() => {
                on_watch_event(&orchestrator, &mut debouncer, event).await;
            }
            Some(change) = fired.recv() => {
                if debouncer.accept(&change) {
                    let report = orchestrator.handle_change(&change.path).await;
                    debug!(
                        path = ?report.path,
                        action = ?report.action,
                        reloads = report.reloads.len(),
                        "Change handled"
                    );
                }
            }
            else => return,
        }
    }
}

async fn on_watch_event(
    orchestrator: &ReloadOrchestrator,
    debouncer: &mut ChangeDebouncer,
    event: WatchEvent,
) {
    match event.kind {
        WatchEventKind::Modified => schedule(orchestrator, debouncer, &event.path),
        WatchEventKind::Created => on_created(orchestrator, debouncer, &event.path).await,
        WatchEventKind::Removed => on_removed(orchestrator, debouncer, &event.path),
        WatchEventKind::Renamed { from } => {
            on_removed(orchestrator, debouncer, &from);
            on_created(orchestrator, debouncer, &event.path).await;
        }
    }
}

fn schedule(orchestrator: &ReloadOrchestrator, debouncer: &mut ChangeDebouncer, path: &Path) {
    let decision = debouncer.on_modified(path, |p| orchestrator.has_file_changed(p));
    if decision != DebounceDecision::Ignored {
        debug!(path = ?path, ?decision, "Modify event");
    }
}

async fn on_created(orchestrator: &ReloadOrchestrator, debouncer: &mut ChangeDebouncer, path: &Path) {
    if !debouncer.filter().should_watch(path) {
        return;
    }
    // editors that save by replacing the file look like a creation
    if orchestrator.is_tracked_file(path) {
        schedule(orchestrator, debouncer, path);
    } else {
        orchestrator.handle_created(path).await;
    }
}

fn on_removed(orchestrator: &ReloadOrchestrator, debouncer: &mut ChangeDebouncer, path: &Path) {
    if !debouncer.filter().matches(path) || debouncer.filter().is_ignored(path) {
        return;
    }
    debouncer.cancel(path);
    orchestrator.handle_removed(path);
}
