//! Reload orchestrator
//!
//! Turns one debounced change into a reload decision and drives the host
//! loader through it. Classification and graph updates happen synchronously
//! under the graph lock; the lock is released before any loader call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use error_stack::{Report, ResultExt};
use futures::future::join_all;
use hotwire_kernel::{
    ExtensionLoader, HotReloadError, HotReloadResult, ModuleError, ModuleObject, ModuleRegistry,
    NoopObserver, ReloadEvent, ReloadOutcome, SpanObserver, SpanOutcome, SpanTimer,
    SpecialReloadHook,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::HotReloadConfig;
use crate::graph::{DependencyGraph, GraphSettings};
use crate::resolver::{PathResolver, is_under};
use crate::watcher::WatchFilter;

/// What a fired change resolves to, in classification priority order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeAction {
    /// Composition-root file: reload as a module, then rebind
    Special { module: String },
    /// Package `__init__`: refresh the package and reload every loaded
    /// extension nested under it
    Package {
        package: String,
        extensions: Vec<String>,
    },
    /// File owned by a loaded extension
    Extension { name: String },
    /// Shared utility module and the loaded extensions depending on it
    Shared {
        module: String,
        dependents: Vec<String>,
    },
    /// Nested file of a loaded extension that the loader does not know
    Ancestor { name: String },
    Ignore { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub extension: String,
    pub outcome: ReloadOutcome,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub elapsed: Duration,
    pub reports: Vec<ReloadReport>,
}

/// Everything done in response to one change
#[derive(Debug, Clone, Serialize)]
pub struct ChangeReport {
    pub path: PathBuf,
    pub action: ChangeAction,
    /// Set when the change was dropped before dispatch (e.g. syntax error)
    pub skipped: Option<String>,
    pub reloads: Vec<ReloadReport>,
    pub refreshed_modules: Vec<String>,
    pub failed_modules: Vec<(String, String)>,
}

impl ChangeReport {
    fn new(path: PathBuf, action: ChangeAction) -> Self {
        Self {
            path,
            action,
            skipped: None,
            reloads: Vec::new(),
            refreshed_modules: Vec::new(),
            failed_modules: Vec::new(),
        }
    }

    /// Names of the extensions the loader actually reloaded or loaded
    pub fn reloaded(&self) -> Vec<&str> {
        self.reloads
            .iter()
            .filter(|r| r.outcome.is_success())
            .map(|r| r.extension.as_str())
            .collect()
    }
}

/// Answer to "what depends on this module"
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub module: String,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    pub loaded_dependent_extensions: Vec<String>,
    pub tracked_module_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub tracked_modules: usize,
    pub edges: usize,
    pub fingerprints: usize,
    pub extension_map: usize,
    pub pending_timers: usize,
}

/// Loaded extensions as reported by the loader for one decision, paired
/// with their long-form names
struct LoadedExtensions {
    entries: Vec<(String, String)>,
}

impl LoadedExtensions {
    fn find(&self, canonical: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(long, _)| long == canonical)
            .map(|(_, name)| name.as_str())
    }

    fn nested_under(&self, package: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|(long, _)| is_under(long, package))
            .filter(|(_, name)| seen.insert(name.clone()))
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn intersect(&self, modules: &HashSet<String>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(long, _)| modules.contains(long))
            .map(|(_, name)| name.clone())
            .collect()
    }
}

pub struct ReloadOrchestrator {
    config: HotReloadConfig,
    resolver: PathResolver,
    filter: WatchFilter,
    loader: Arc<dyn ExtensionLoader>,
    registry: Arc<dyn ModuleRegistry>,
    special_hook: Option<Arc<dyn SpecialReloadHook>>,
    observer: Arc<dyn SpanObserver>,
    graph: Mutex<DependencyGraph>,
    extension_map: RwLock<HashMap<PathBuf, String>>,
    special_files: HashSet<PathBuf>,
    shared_dirs: Vec<PathBuf>,
    eviction_lock: Mutex<()>,
    event_tx: broadcast::Sender<ReloadEvent>,
}

impl ReloadOrchestrator {
    pub fn new(
        config: HotReloadConfig,
        loader: Arc<dyn ExtensionLoader>,
        registry: Arc<dyn ModuleRegistry>,
    ) -> HotReloadResult<Self> {
        config
            .validate()
            .map_err(|e| Report::new(HotReloadError::Config(e.to_string())))
            .attach(format!("root: {}", config.root_dir.display()))?;

        let namespace = config
            .namespace()
            .map_err(|e| Report::new(HotReloadError::Config(e.to_string())))?;
        let resolver = PathResolver::new(&config.root_dir, namespace);
        let filter = WatchFilter::new(
            resolver.root(),
            &config.watch_patterns,
            &config.ignore_patterns,
        )
        .map_err(|e| Report::new(HotReloadError::Config(e.to_string())))?;

        let special_files = config
            .special_files
            .iter()
            .map(|file| normalize(&resolver.root().join(file)))
            .collect();
        let shared_dirs = config
            .shared_dirs
            .iter()
            .map(|dir| normalize(&resolver.root().join(dir)))
            .collect();

        let graph = DependencyGraph::new(resolver.clone(), GraphSettings::from_config(&config));
        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            config,
            resolver,
            filter,
            loader,
            registry,
            special_hook: None,
            observer: Arc::new(NoopObserver),
            graph: Mutex::new(graph),
            extension_map: RwLock::new(HashMap::new()),
            special_files,
            shared_dirs,
            eviction_lock: Mutex::new(()),
            event_tx,
        })
    }

    pub fn with_special_hook(mut self, hook: Arc<dyn SpecialReloadHook>) -> Self {
        self.special_hook = Some(hook);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SpanObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn filter(&self) -> &WatchFilter {
        &self.filter
    }

    fn emit(&self, event: ReloadEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    async fn loaded(&self) -> LoadedExtensions {
        let entries = self
            .loader
            .loaded_extensions()
            .await
            .into_iter()
            .map(|name| (self.resolver.canonical_name(&name), name))
            .collect();
        LoadedExtensions { entries }
    }

    fn extension_file(&self, name: &str) -> PathBuf {
        let canonical = self.resolver.canonical_name(name);
        let mapped = self
            .extension_map
            .read()
            .iter()
            .find(|(_, ext)| self.resolver.canonical_name(ext) == canonical)
            .map(|(path, _)| path.clone());

        mapped
            .or_else(|| self.loader.extension_path(name).map(|p| normalize(&p)))
            .unwrap_or_else(|| self.resolver.path_from_extension(name))
    }

    /// Map loaded extensions to their files and seed the graph.
    ///
    /// Walks the root once to seed fingerprints (when enabled) and the import
    /// edges of every source file, so shared modules imported through other
    /// helpers are reachable from the start.
    pub async fn initialize(&self) {
        let span = SpanTimer::start(self.observer.as_ref(), "initialize");
        let loaded = self.loaded().await;

        let mut mapped = Vec::new();
        for (long, name) in &loaded.entries {
            let path = self.extension_file(name);
            if path.is_file() {
                mapped.push((path, long.clone(), name.clone()));
            } else {
                warn!(extension = %name, path = ?path, "Loaded extension has no source file");
            }
        }

        {
            let mut map = self.extension_map.write();
            for (path, _, name) in &mapped {
                map.insert(path.clone(), name.clone());
            }
        }

        let mut graph = self.graph.lock();
        for (path, long, _) in &mapped {
            graph.update_dependencies(path, long);
        }

        let prepopulate = self.config.prepopulate_fingerprints;
        let mut seeded = 0usize;
        let mut scanned = 0usize;
        for entry in WalkDir::new(self.resolver.root())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if self.filter.is_ignored(path) || !self.is_hash_eligible(path) {
                continue;
            }
            if prepopulate && graph.fingerprints_mut().seed(path) {
                seeded += 1;
            }
            if let Some(module) = self.resolver.module_name(path) {
                if !graph.is_tracking(&module) {
                    graph.update_dependencies(path, &module);
                    scanned += 1;
                }
                graph.track_definitions(path);
            }
        }
        drop(graph);

        info!(
            extensions = mapped.len(),
            modules_scanned = scanned,
            fingerprints = seeded,
            "Hot-reload engine initialized"
        );
        span.finish(SpanOutcome::Ok);
    }

    fn is_hash_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.hash_extensions.iter().any(|h| h == ext))
    }

    /// Fingerprint check used by the debouncer
    pub fn has_file_changed(&self, path: &Path) -> bool {
        self.graph.lock().has_file_changed(&normalize(path))
    }

    /// Whether the file already has a fingerprint
    pub fn is_tracked_file(&self, path: &Path) -> bool {
        self.graph.lock().fingerprints().contains(&normalize(path))
    }

    /// Register a newly created source file. Its first content is only seeded.
    pub async fn handle_created(&self, path: &Path) -> Option<String> {
        let path = normalize(path);
        if !self.filter.should_watch(&path) {
            return None;
        }
        let module = self.resolver.module_name(&path);

        {
            let mut graph = self.graph.lock();
            graph.fingerprints_mut().seed(&path);
            if let Some(module) = &module {
                graph.update_dependencies(&path, module);
                graph.track_definitions(&path);
            }
        }

        if let Some(module) = &module {
            let loaded = self.loaded().await;
            if let Some(name) = loaded.find(module) {
                info!(extension = %name, path = ?path, "Mapped new extension source");
                self.extension_map.write().insert(path.clone(), name.to_string());
            }
        }

        debug!(path = ?path, module = ?module, "Source file discovered");
        self.emit(ReloadEvent::FileDiscovered { path });
        module
    }

    /// Drop all tracking for a removed source file
    pub fn handle_removed(&self, path: &Path) -> Option<String> {
        let path = normalize(path);
        let module = self.resolver.module_name(&path);

        {
            let mut graph = self.graph.lock();
            graph.forget_file(&path);
            if let Some(module) = &module {
                graph.remove_module(module);
            }
        }

        if let Some(extension) = self.extension_map.write().remove(&path) {
            warn!(extension = %extension, path = ?path, "Source of loaded extension removed");
        }

        debug!(path = ?path, module = ?module, "Source file removed");
        self.emit(ReloadEvent::FileRemoved {
            path,
            module: module.clone(),
        });
        module
    }

    /// Process one debounced change end to end
    pub async fn handle_change(&self, path: &Path) -> ChangeReport {
        let path = normalize(path);
        let module = self.resolver.module_name(&path);
        self.emit(ReloadEvent::ChangeDetected {
            path: path.clone(),
            module: module.clone(),
        });

        let loaded = self.loaded().await;
        let action = {
            let mut graph = self.graph.lock();
            if let Some(module) = &module {
                if path.is_file() {
                    let span = SpanTimer::start(self.observer.as_ref(), "update_dependencies");
                    graph.update_dependencies(&path, module);
                    span.finish(SpanOutcome::Ok);
                }
                if let Some(diff) = graph.track_definitions(&path) {
                    if !diff.is_empty() {
                        debug!(
                            path = ?path,
                            body_only = diff.is_body_only(),
                            "Definitions changed"
                        );
                        self.emit(ReloadEvent::DefinitionsChanged {
                            path: path.clone(),
                            added: diff.added,
                            removed: diff.removed,
                            modified: diff.modified,
                        });
                    }
                }
            }
            self.classify(&path, module.as_deref(), &loaded, &graph)
        };

        self.execute(path, action).await
    }

    fn classify(
        &self,
        path: &Path,
        module: Option<&str>,
        loaded: &LoadedExtensions,
        graph: &DependencyGraph,
    ) -> ChangeAction {
        let Some(module) = module else {
            return ChangeAction::Ignore {
                reason: "not a module under the managed root".to_string(),
            };
        };

        if self.special_files.contains(path) {
            return ChangeAction::Special {
                module: module.to_string(),
            };
        }

        if self.resolver.is_package_root(path) {
            return ChangeAction::Package {
                package: module.to_string(),
                extensions: loaded.nested_under(module),
            };
        }

        let mapped = self.extension_map.read().get(path).cloned();
        let owner = mapped
            .filter(|name| loaded.find(&self.resolver.canonical_name(name)).is_some())
            .or_else(|| loaded.find(module).map(str::to_string));
        if let Some(name) = owner {
            return ChangeAction::Extension { name };
        }

        if self.shared_dirs.iter().any(|dir| path.starts_with(dir)) {
            let dependents = graph.get_transitive_dependents(module);
            return ChangeAction::Shared {
                module: module.to_string(),
                dependents: loaded.intersect(&dependents),
            };
        }

        let mut candidate = module;
        while let Some((parent, _)) = candidate.rsplit_once('.') {
            if let Some(name) = loaded.find(parent) {
                return ChangeAction::Ancestor {
                    name: name.to_string(),
                };
            }
            candidate = parent;
        }

        ChangeAction::Ignore {
            reason: format!("{module} is not owned by a loaded extension"),
        }
    }

    async fn execute(&self, path: PathBuf, action: ChangeAction) -> ChangeReport {
        let mut report = ChangeReport::new(path, action.clone());

        if let ChangeAction::Ignore { reason } = &action {
            debug!(path = ?report.path, reason = %reason, "No reload for change");
            return report;
        }

        if self.config.validate_syntax && report.path.is_file() {
            let validation = self.graph.lock().validate_file(&report.path);
            if let Err(e) = validation {
                warn!(path = ?report.path, error = %e, "Syntax error, skipping reload");
                report.skipped = Some(e.to_string());
                return report;
            }
        }

        match action {
            ChangeAction::Special { module } => {
                self.refresh_special(&module, &mut report).await;
            }
            ChangeAction::Package {
                package,
                extensions,
            } => {
                let package_is_extension = extensions
                    .iter()
                    .any(|e| self.resolver.canonical_name(e) == package);
                if !package_is_extension && self.registry.get(&package).is_some() {
                    self.refresh_module(&package, &mut report);
                }
                if !extensions.is_empty() {
                    report.reloads = self.reload_batch(&extensions).await.reports;
                }
            }
            ChangeAction::Extension { name } | ChangeAction::Ancestor { name } => {
                report.reloads.push(self.reload_extension(&name).await);
            }
            ChangeAction::Shared { module, dependents } => {
                if self.registry.get(&module).is_some() {
                    self.refresh_module(&module, &mut report);
                }
                if dependents.is_empty() {
                    info!(module = %module, "Shared module changed, no loaded dependents");
                } else {
                    report.reloads = self.reload_batch(&dependents).await.reports;
                }
            }
            ChangeAction::Ignore { .. } => {}
        }
        report
    }

    fn refresh_module(&self, name: &str, report: &mut ChangeReport) -> Option<ModuleObject> {
        match self.reload_module(name) {
            Ok(module) => {
                report.refreshed_modules.push(name.to_string());
                Some(module)
            }
            Err(e) => {
                report.failed_modules.push((name.to_string(), e.to_string()));
                None
            }
        }
    }

    async fn refresh_special(&self, name: &str, report: &mut ChangeReport) {
        tokio::time::sleep(self.config.settle_delay).await;
        let Some(module) = self.refresh_module(name, report) else {
            return;
        };
        let Some(hook) = &self.special_hook else {
            return;
        };
        match hook.rebind(&module).await {
            Ok(()) => info!(module = %name, "Special module reloaded and rebound"),
            Err(e) => {
                error!(module = %name, error = %e, "Rebind after special reload failed");
                report.failed_modules.push((name.to_string(), e.to_string()));
            }
        }
    }

    /// Reload a module through the registry, restoring the previous entry
    /// (or its absence) on failure
    pub fn reload_module(&self, name: &str) -> Result<ModuleObject, ModuleError> {
        let span = SpanTimer::start(self.observer.as_ref(), format!("reload_module:{name}"));
        let previous = self.registry.get(name);

        match self.registry.reload_in_place(name, previous.as_ref()) {
            Ok(fresh) => {
                self.registry.set(name, fresh.clone());
                let duration = span.finish(SpanOutcome::Ok);
                debug!(module = %name, ?duration, "Module reloaded");
                self.emit(ReloadEvent::ModuleReloaded {
                    module: name.to_string(),
                    duration,
                });
                Ok(fresh)
            }
            Err(e) => {
                match previous {
                    Some(original) => self.registry.set(name, original),
                    None => {
                        self.registry.remove(name);
                    }
                }
                span.finish(SpanOutcome::Error);
                warn!(module = %name, error = %e, "Module reload failed, rolled back");
                self.emit(ReloadEvent::RollbackTriggered {
                    module: name.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Remove registry entries nested under an extension so the reload
    /// re-imports them from source
    fn evict_submodules(&self, name: &str) -> usize {
        let _guard = self.eviction_lock.lock();

        let long = self.resolver.canonical_name(name);
        let short = self.resolver.short_name(&long).to_string();
        let file = self.extension_file(name);
        let package_dir = self
            .resolver
            .is_package_root(&file)
            .then(|| file.parent().map(Path::to_path_buf))
            .flatten();

        let mut evicted = 0;
        for module in self.registry.modules() {
            let module_name = module.name();
            if module_name == long || module_name == short || module_name == name {
                continue;
            }
            let nested = is_under(module_name, &long) || is_under(module_name, &short);
            let inside = match (&package_dir, module.origin()) {
                (Some(dir), Some(origin)) => origin.starts_with(dir) && origin != file,
                _ => false,
            };
            if nested || inside {
                self.registry.remove(module_name);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!(extension = %name, evicted, "Evicted nested modules");
        }
        evicted
    }

    async fn reload_one(&self, name: &str, log_result: bool) -> ReloadReport {
        let span = SpanTimer::start(self.observer.as_ref(), format!("reload:{name}"));
        self.emit(ReloadEvent::ReloadStarted {
            extension: name.to_string(),
        });

        tokio::time::sleep(self.config.settle_delay).await;

        let mut outcome = None;
        if self.config.validate_syntax {
            let file = self.extension_file(name);
            if file.is_file() {
                let validation = self.graph.lock().validate_file(&file);
                if let Err(e) = validation {
                    outcome = Some(ReloadOutcome::Skipped {
                        reason: e.to_string(),
                    });
                }
            }
        }

        let outcome = match outcome {
            Some(skipped) => skipped,
            None => {
                self.evict_submodules(name);
                match self.loader.reload_extension(name).await {
                    Ok(()) => ReloadOutcome::Reloaded,
                    Err(e) if e.is_not_loaded() => match self.loader.load_extension(name).await {
                        Ok(()) => ReloadOutcome::Loaded,
                        Err(e) => ReloadOutcome::Failed {
                            error: e.to_string(),
                        },
                    },
                    Err(e) => ReloadOutcome::Failed {
                        error: e.to_string(),
                    },
                }
            }
        };

        let duration = span.finish(match &outcome {
            ReloadOutcome::Reloaded | ReloadOutcome::Loaded => SpanOutcome::Ok,
            ReloadOutcome::Skipped { .. } => SpanOutcome::Skipped,
            ReloadOutcome::Failed { .. } => SpanOutcome::Error,
        });

        match &outcome {
            ReloadOutcome::Failed { error } if log_result => {
                error!(extension = %name, error = %error, "Extension reload failed")
            }
            ReloadOutcome::Skipped { reason } if log_result => {
                warn!(extension = %name, reason = %reason, "Extension reload skipped")
            }
            _ if log_result => info!(extension = %name, %outcome, ?duration, "Extension reloaded"),
            _ => debug!(extension = %name, %outcome, ?duration, "Batch member finished"),
        }

        self.emit(ReloadEvent::ReloadCompleted {
            extension: name.to_string(),
            outcome: outcome.clone(),
            duration,
        });

        ReloadReport {
            extension: name.to_string(),
            outcome,
            duration,
        }
    }

    /// Reload a single extension, logging its result
    pub async fn reload_extension(&self, name: &str) -> ReloadReport {
        self.reload_one(name, true).await
    }

    /// Reload extensions concurrently; one summary line for the whole batch
    pub async fn reload_batch(&self, names: &[String]) -> BatchReport {
        let span = SpanTimer::start(self.observer.as_ref(), "reload_batch");
        let started = Instant::now();

        let mut seen = HashSet::new();
        let unique: Vec<&String> = names.iter().filter(|n| seen.insert(n.as_str())).collect();

        let reports = join_all(unique.iter().map(|name| self.reload_one(name, false))).await;
        let succeeded = reports.iter().filter(|r| r.outcome.is_success()).count();
        let attempted = reports.len();
        let elapsed = started.elapsed();

        info!(
            succeeded,
            attempted,
            ?elapsed,
            "Batch reload finished: {}/{} extensions",
            succeeded,
            attempted
        );
        span.finish(if succeeded == attempted {
            SpanOutcome::Ok
        } else {
            SpanOutcome::Error
        });
        self.emit(ReloadEvent::BatchCompleted {
            attempted,
            succeeded,
            elapsed,
        });

        BatchReport {
            attempted,
            succeeded,
            elapsed,
            reports,
        }
    }

    pub async fn debug_dependencies(&self, module: &str) -> DependencyReport {
        let module = self.resolver.canonical_name(module);
        let loaded = self.loaded().await;
        let graph = self.graph.lock();

        let mut direct: Vec<String> = graph.get_dependents(&module).into_iter().collect();
        let transitive_set = graph.get_transitive_dependents(&module);
        let mut transitive: Vec<String> = transitive_set.iter().cloned().collect();
        direct.sort();
        transitive.sort();

        DependencyReport {
            direct_dependents: direct,
            transitive_dependents: transitive,
            loaded_dependent_extensions: loaded.intersect(&transitive_set),
            tracked_module_count: graph.tracked_module_count(),
            module,
        }
    }

    pub fn stats(&self) -> EngineStats {
        let graph = self.graph.lock();
        EngineStats {
            tracked_modules: graph.tracked_module_count(),
            edges: graph.edge_count(),
            fingerprints: graph.fingerprints().len(),
            extension_map: self.extension_map.read().len(),
            pending_timers: 0,
        }
    }

    /// Clear the graph, caches and extension map
    pub fn teardown(&self) {
        self.graph.lock().clear();
        self.extension_map.write().clear();
        debug!("Hot-reload caches cleared");
    }
}

/// Canonical form of a path, tolerating files that no longer exist
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent().and_then(|p| p.canonicalize().ok()), path.file_name()) {
        (Some(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotwire_testing::{InMemoryRegistry, RecordingLoader, SourceTree};

    fn orchestrator(tree: &SourceTree, loader: Arc<RecordingLoader>) -> ReloadOrchestrator {
        let config = HotReloadConfig::new(tree.root())
            .with_settle_delay(Duration::ZERO)
            .with_shared_dirs(&["utils"]);
        ReloadOrchestrator::new(config, loader, Arc::new(InMemoryRegistry::new())).unwrap()
    }

    #[tokio::test]
    async fn invalid_config_is_a_config_error() {
        let config = HotReloadConfig::new("/srv/app/bot").with_max_depth(0);
        let result = ReloadOrchestrator::new(
            config,
            Arc::new(RecordingLoader::new()),
            Arc::new(InMemoryRegistry::new()),
        );
        let report = result.err().unwrap();
        assert!(matches!(report.current_context(), HotReloadError::Config(_)));
    }

    #[tokio::test]
    async fn classification_priority() {
        let tree = SourceTree::new("bot")
            .file("__init__.py", "")
            .file("cogs/__init__.py", "")
            .file("cogs/admin.py", "")
            .file("cogs/music/__init__.py", "")
            .file("cogs/music/player.py", "")
            .file("utils/__init__.py", "")
            .file("utils/embeds.py", "")
            .file("scripts/tool.py", "");
        let loader = Arc::new(
            RecordingLoader::new()
                .with_loaded("cogs.admin")
                .with_loaded("bot.cogs.music"),
        );
        let orch = orchestrator(&tree, loader);
        orch.initialize().await;

        let loaded = orch.loaded().await;
        let classify = |rel: &str| {
            let path = normalize(&tree.path(rel));
            let module = orch.resolver().module_name(&path);
            let graph = orch.graph.lock();
            orch.classify(&path, module.as_deref(), &loaded, &graph)
        };

        assert_eq!(
            classify("cogs/__init__.py"),
            ChangeAction::Package {
                package: "bot.cogs".into(),
                extensions: vec!["cogs.admin".into(), "bot.cogs.music".into()],
            }
        );
        assert_eq!(
            classify("cogs/admin.py"),
            ChangeAction::Extension {
                name: "cogs.admin".into()
            }
        );
        assert_eq!(
            classify("cogs/music/player.py"),
            ChangeAction::Ancestor {
                name: "bot.cogs.music".into()
            }
        );
        assert_eq!(
            classify("utils/embeds.py"),
            ChangeAction::Shared {
                module: "bot.utils.embeds".into(),
                dependents: vec![],
            }
        );
        assert!(matches!(classify("scripts/tool.py"), ChangeAction::Ignore { .. }));
    }

    #[tokio::test]
    async fn created_and_removed_files_update_tracking() {
        let tree = SourceTree::new("bot").file("cogs/admin.py", "");
        let loader = Arc::new(RecordingLoader::new().with_loaded("cogs.fresh"));
        let orch = orchestrator(&tree, loader);
        orch.initialize().await;
        let mut events = orch.subscribe();

        let fresh = tree.write("cogs/fresh.py", "import bot.cogs.admin\n");
        assert_eq!(orch.handle_created(&fresh).await.as_deref(), Some("bot.cogs.fresh"));
        assert!(orch.is_tracked_file(&fresh));
        assert_eq!(orch.stats().extension_map, 1);
        assert!(matches!(events.recv().await.unwrap(), ReloadEvent::FileDiscovered { .. }));

        let deps = orch.debug_dependencies("cogs.admin").await;
        assert_eq!(deps.direct_dependents, vec!["bot.cogs.fresh".to_string()]);

        tree.remove("cogs/fresh.py");
        orch.handle_removed(&fresh);
        assert!(!orch.is_tracked_file(&fresh));
        assert_eq!(orch.stats().extension_map, 0);
        assert!(orch.debug_dependencies("cogs.admin").await.direct_dependents.is_empty());
    }

    #[tokio::test]
    async fn eviction_removes_nested_modules_only() {
        let tree = SourceTree::new("bot")
            .file("cogs/music/__init__.py", "")
            .file("cogs/music/player.py", "")
            .file("cogs/admin.py", "");
        let registry = Arc::new(InMemoryRegistry::new());
        let music_dir = normalize(&tree.path("cogs/music"));
        registry.insert(ModuleObject::new("bot.cogs.music", 1u8).with_origin(music_dir.join("__init__.py")));
        registry.insert(ModuleObject::new("bot.cogs.music.player", 1u8));
        registry.insert(ModuleObject::new("music_helpers", 1u8).with_origin(music_dir.join("helpers.py")));
        registry.insert(ModuleObject::new("bot.cogs.admin", 1u8));
        registry.insert(ModuleObject::new("bot.cogs.musicbox", 1u8));

        let config = HotReloadConfig::new(tree.root()).with_settle_delay(Duration::ZERO);
        let orch = ReloadOrchestrator::new(
            config,
            Arc::new(RecordingLoader::new().with_loaded("cogs.music")),
            registry.clone(),
        )
        .unwrap();
        orch.initialize().await;

        assert_eq!(orch.evict_submodules("cogs.music"), 2);
        assert!(registry.contains("bot.cogs.music"));
        assert!(!registry.contains("bot.cogs.music.player"));
        assert!(!registry.contains("music_helpers"));
        assert!(registry.contains("bot.cogs.admin"));
        assert!(registry.contains("bot.cogs.musicbox"));
    }

    #[tokio::test]
    async fn teardown_clears_everything() {
        let tree = SourceTree::new("bot")
            .file("cogs/admin.py", "import bot.utils.embeds\n")
            .file("utils/embeds.py", "");
        let orch = orchestrator(&tree, Arc::new(RecordingLoader::new().with_loaded("cogs.admin")));
        orch.initialize().await;

        let stats = orch.stats();
        assert_eq!(stats.extension_map, 1);
        assert_eq!(stats.fingerprints, 2);
        assert!(stats.edges >= 1);

        orch.teardown();
        let stats = orch.stats();
        assert_eq!(
            (stats.tracked_modules, stats.edges, stats.fingerprints, stats.extension_map),
            (0, 0, 0, 0)
        );
    }
}
