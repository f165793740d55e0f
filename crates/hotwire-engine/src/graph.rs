//! Module dependency graph
//!
//! Forward edges record what each module imports from the managed tree;
//! reverse edges are their exact transpose and answer "who depends on
//! this". Every mutation goes through [`DependencyGraph::retract`] and
//! [`DependencyGraph::install`] so the two indexes never disagree.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::HotReloadConfig;
use crate::definitions::{DefinitionDiff, DefinitionTracker};
use crate::fingerprint::ContentFingerprinter;
use crate::resolver::{PathResolver, is_under};
use crate::syntax::{ImportStatement, ParseError, SourceParser};

/// Graph tuning, taken from [`HotReloadConfig`]
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Hop limit for transitive dependent queries
    pub max_depth: usize,
    /// Fingerprint cache size that forces a cleanup pass
    pub cleanup_threshold: usize,
    /// Minimum time between periodic cleanup passes
    pub cleanup_interval: Duration,
    /// Age after which an unscanned module is evicted
    pub stale_after: Duration,
    /// Absolute import prefixes tracked besides the root namespace
    pub tracked_prefixes: Vec<String>,
    /// When off, scans record no edges
    pub track_dependencies: bool,
    /// Keep per-file definition snapshots for diffs
    pub track_definitions: bool,
}

impl GraphSettings {
    /// Pick the graph-related knobs out of the engine config
    pub fn from_config(config: &HotReloadConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            cleanup_threshold: config.cleanup_threshold,
            cleanup_interval: config.cleanup_interval,
            stale_after: config.stale_after,
            tracked_prefixes: config.tracked_prefixes.clone(),
            track_dependencies: config.track_dependencies,
            track_definitions: config.track_definitions,
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self::from_config(&HotReloadConfig::default())
    }
}

/// Forward and reverse import edges between in-tree modules, together with
/// the per-file caches (fingerprints, definition snapshots) that share its
/// lifetime.
///
/// The reverse index is always the exact transpose of the forward index.
pub struct DependencyGraph {
    resolver: PathResolver,
    parser: Option<SourceParser>,
    fingerprints: ContentFingerprinter,
    definitions: Option<DefinitionTracker>,
    forward: HashMap<String, HashSet<String>>,
    reverse: HashMap<String, HashSet<String>>,
    last_scan: HashMap<String, Instant>,
    settings: GraphSettings,
    last_cleanup: Instant,
}

impl DependencyGraph {
    pub fn new(resolver: PathResolver, settings: GraphSettings) -> Self {
        let parser = match SourceParser::new() {
            Ok(parser) => Some(parser),
            Err(e) => {
                warn!(error = %e, "Source parser unavailable, dependency scanning disabled");
                None
            }
        };
        let definitions = settings.track_definitions.then(DefinitionTracker::new);

        Self {
            resolver,
            parser,
            fingerprints: ContentFingerprinter::new(),
            definitions,
            forward: HashMap::new(),
            reverse: HashMap::new(),
            last_scan: HashMap::new(),
            settings,
            last_cleanup: Instant::now(),
        }
    }

    /// Resolver used to map files to module names
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Active tuning knobs
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Content hash cache for every seen file
    pub fn fingerprints(&self) -> &ContentFingerprinter {
        &self.fingerprints
    }

    pub fn fingerprints_mut(&mut self) -> &mut ContentFingerprinter {
        &mut self.fingerprints
    }

    /// See [`ContentFingerprinter::has_file_changed`]
    pub fn has_file_changed(&mut self, path: &Path) -> bool {
        self.fingerprints.has_file_changed(path)
    }

    fn is_tracked(&self, name: &str) -> bool {
        self.resolver.in_namespace(name)
            || self
                .settings
                .tracked_prefixes
                .iter()
                .any(|prefix| is_under(name, prefix))
    }

    /// In-tree modules imported by the file at `path`.
    ///
    /// Unreadable or unparseable files yield an empty set.
    pub fn scan_dependencies(&mut self, path: &Path) -> HashSet<String> {
        let Some(parser) = self.parser.as_mut() else {
            return HashSet::new();
        };
        let imports = match parser.file_imports(path) {
            Ok(imports) => imports,
            Err(e) => {
                debug!(path = ?path, error = %e, "Cannot scan imports");
                return HashSet::new();
            }
        };

        let mut deps = HashSet::new();
        for import in imports {
            match import {
                ImportStatement::Module { name } => {
                    if self.is_tracked(&name) {
                        deps.insert(name);
                    }
                }
                ImportStatement::From {
                    level: 0,
                    module: Some(module),
                    names,
                } => {
                    if !self.is_tracked(&module) {
                        continue;
                    }
                    for name in names {
                        let candidate = format!("{module}.{name}");
                        if self.resolver.in_namespace(&candidate)
                            && self.resolver.module_exists(&candidate)
                        {
                            deps.insert(candidate);
                        }
                    }
                    deps.insert(module);
                }
                ImportStatement::From {
                    level,
                    module: Some(module),
                    names,
                } => {
                    let Some(base) = self.resolver.resolve_relative(path, level, Some(&module), None)
                    else {
                        continue;
                    };
                    for name in names {
                        let candidate = format!("{base}.{name}");
                        if self.resolver.module_exists(&candidate) {
                            deps.insert(candidate);
                        }
                    }
                    deps.insert(base);
                }
                ImportStatement::From {
                    level,
                    module: None,
                    names,
                } => {
                    let Some(package) = self.resolver.resolve_relative(path, level, None, None)
                    else {
                        continue;
                    };
                    let mut found_submodule = false;
                    for name in names {
                        let candidate = format!("{package}.{name}");
                        if self.resolver.module_exists(&candidate) {
                            deps.insert(candidate);
                            found_submodule = true;
                        }
                    }
                    if !found_submodule {
                        deps.insert(package);
                    }
                }
            }
        }

        if let Some(own) = self.resolver.module_name(path) {
            deps.remove(&own);
        }
        deps
    }

    /// Rescan `path` and replace the forward edges of `module`
    pub fn update_dependencies(&mut self, path: &Path, module: &str) -> HashSet<String> {
        let deps = if self.settings.track_dependencies {
            self.scan_dependencies(path)
        } else {
            HashSet::new()
        };

        self.retract(module);
        self.install(module, &deps);
        self.last_scan.insert(module.to_string(), Instant::now());

        debug!(module, dependencies = deps.len(), "Dependencies updated");
        self.cleanup_if_needed();
        deps
    }

    fn retract(&mut self, module: &str) {
        let Some(old) = self.forward.remove(module) else {
            return;
        };
        for dep in old {
            if let Some(importers) = self.reverse.get_mut(&dep) {
                importers.remove(module);
                if importers.is_empty() {
                    self.reverse.remove(&dep);
                }
            }
        }
    }

    fn install(&mut self, module: &str, deps: &HashSet<String>) {
        for dep in deps {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(module.to_string());
        }
        self.forward.insert(module.to_string(), deps.clone());
    }

    /// Stop tracking a module's own imports
    pub fn remove_module(&mut self, module: &str) -> bool {
        let tracked = self.forward.contains_key(module);
        self.retract(module);
        self.last_scan.remove(module);
        tracked
    }

    /// Modules that import `module` directly
    pub fn get_dependents(&self, module: &str) -> HashSet<String> {
        self.reverse.get(module).cloned().unwrap_or_default()
    }

    /// Modules that `module` imports directly
    pub fn get_dependencies(&self, module: &str) -> HashSet<String> {
        self.forward.get(module).cloned().unwrap_or_default()
    }

    /// Transitive dependents bounded by the configured `max_depth`
    pub fn get_transitive_dependents(&self, module: &str) -> HashSet<String> {
        self.get_transitive_dependents_with_depth(module, self.settings.max_depth)
    }

    /// Breadth-first walk of reverse edges, at most `max_depth` hops out.
    /// The origin is never part of the result.
    pub fn get_transitive_dependents_with_depth(
        &self,
        module: &str,
        max_depth: usize,
    ) -> HashSet<String> {
        let mut visited: HashSet<&str> = HashSet::from([module]);
        let mut result = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(module, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(importers) = self.reverse.get(current) else {
                continue;
            };
            for importer in importers {
                if visited.insert(importer.as_str()) {
                    result.insert(importer.clone());
                    queue.push_back((importer.as_str(), depth + 1));
                }
            }
        }
        result
    }

    /// Returns the number of evicted modules
    pub fn cleanup_if_needed(&mut self) -> usize {
        self.cleanup_if_needed_at(Instant::now())
    }

    /// Run a cleanup pass when the fingerprint cache is over its threshold
    /// or the cleanup interval has elapsed
    pub fn cleanup_if_needed_at(&mut self, now: Instant) -> usize {
        let oversized = self.fingerprints.len() > self.settings.cleanup_threshold;
        let due = now.saturating_duration_since(self.last_cleanup) >= self.settings.cleanup_interval;
        if !oversized && !due {
            return 0;
        }
        self.last_cleanup = now;
        self.cleanup_stale(now)
    }

    /// Drop tracking for modules not rescanned within `stale_after`
    pub fn cleanup_stale(&mut self, now: Instant) -> usize {
        let stale_after = self.settings.stale_after;
        let stale: Vec<String> = self
            .last_scan
            .iter()
            .filter(|(_, scanned)| now.saturating_duration_since(**scanned) > stale_after)
            .map(|(module, _)| module.clone())
            .collect();

        for module in &stale {
            self.remove_module(module);
        }
        let pruned = self.fingerprints.retain_existing();

        if !stale.is_empty() || pruned > 0 {
            info!(
                stale_modules = stale.len(),
                pruned_fingerprints = pruned,
                "Dependency graph cleanup"
            );
        }
        stale.len()
    }

    /// Diff the file's top-level definitions against its last snapshot
    pub fn track_definitions(&mut self, path: &Path) -> Option<DefinitionDiff> {
        let parser = self.parser.as_mut()?;
        let tracker = self.definitions.as_mut()?;
        tracker.track(parser, path)
    }

    /// Drop the fingerprint and definition snapshot of a file
    pub fn forget_file(&mut self, path: &Path) {
        self.fingerprints.forget(path);
        if let Some(tracker) = self.definitions.as_mut() {
            tracker.forget(path);
        }
    }

    /// Syntax check; passes when no parser is available
    pub fn validate_file(&mut self, path: &Path) -> Result<(), ParseError> {
        match self.parser.as_mut() {
            Some(parser) => parser.validate_file(path),
            None => Ok(()),
        }
    }

    /// Modules with a recorded scan
    pub fn tracked_module_count(&self) -> usize {
        self.forward.len()
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(HashSet::len).sum()
    }

    /// Whether `module`'s own imports have been scanned
    pub fn is_tracking(&self, module: &str) -> bool {
        self.forward.contains_key(module)
    }

    /// Reverse index is the exact transpose of the forward index
    pub fn is_consistent(&self) -> bool {
        let mut transpose: HashMap<&str, HashSet<&str>> = HashMap::new();
        for (module, deps) in &self.forward {
            for dep in deps {
                transpose.entry(dep).or_default().insert(module);
            }
        }
        transpose.len() == self.reverse.len()
            && self.reverse.iter().all(|(dep, importers)| {
                transpose.get(dep.as_str()).is_some_and(|expected| {
                    expected.len() == importers.len()
                        && importers.iter().all(|i| expected.contains(i.as_str()))
                })
            })
    }

    /// Drop every edge and cache
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.last_scan.clear();
        self.fingerprints.clear();
        if let Some(tracker) = self.definitions.as_mut() {
            tracker.clear();
        }
    }

    #[cfg(test)]
    fn set_edges(&mut self, module: &str, deps: &[&str]) {
        self.set_edges_at(module, deps, Instant::now());
    }

    #[cfg(test)]
    fn set_edges_at(&mut self, module: &str, deps: &[&str], scanned: Instant) {
        let deps: HashSet<String> = deps.iter().map(|d| d.to_string()).collect();
        self.retract(module);
        self.install(module, &deps);
        self.last_scan.insert(module.to_string(), scanned);
    }
}
