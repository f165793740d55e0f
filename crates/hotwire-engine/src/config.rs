//! Hot-reload configuration
//!
//! Every knob is independently overridable, either through the `with_*`
//! builder methods or from a TOML/YAML/JSON file layered with `HOTWIRE__*`
//! environment variables. Durations are written in milliseconds in files
//! (`debounce_ms`, `settle_delay_ms`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as Cfg, Environment, File, FileFormat};
use serde::{Deserialize, Deserializer};

use crate::watcher::WatchFilter;

/// Prefix for environment overrides, e.g. `HOTWIRE__DEBOUNCE_MS=250`.
pub const ENV_PREFIX: &str = "HOTWIRE";

/// Configuration error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid debounce delay {0:?}: must be between 1ms and 60s")]
    InvalidDebounce(Duration),

    #[error("Invalid cleanup threshold {0}: must be positive")]
    InvalidCleanupThreshold(usize),

    #[error("Invalid max depth {0}: must be at least 1")]
    InvalidMaxDepth(usize),

    #[error("Invalid glob pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Cannot derive a namespace from root {0:?}; set `namespace` explicitly")]
    MissingNamespace(PathBuf),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Hot-reload configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotReloadConfig {
    /// Managed package directory (e.g. `/srv/app/bot`)
    pub root_dir: PathBuf,
    /// Logical namespace of the root; defaults to the root directory name
    pub namespace: Option<String>,
    /// Extra absolute-import prefixes tracked as dependencies
    pub tracked_prefixes: Vec<String>,
    /// Quiet period before a change fires
    #[serde(rename = "debounce_ms", deserialize_with = "duration_ms")]
    pub debounce: Duration,
    /// Pause before each reload attempt so the triggering write completes
    #[serde(rename = "settle_delay_ms", deserialize_with = "duration_ms")]
    pub settle_delay: Duration,
    /// Upper bound for releasing the OS watch handle on stop
    #[serde(rename = "shutdown_timeout_ms", deserialize_with = "duration_ms")]
    pub shutdown_timeout: Duration,
    /// Fingerprint cache size that triggers a cleanup pass
    pub cleanup_threshold: usize,
    /// Time between cleanup passes
    #[serde(rename = "cleanup_interval_ms", deserialize_with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Modules not rescanned for this long are evicted by cleanup
    #[serde(rename = "stale_after_ms", deserialize_with = "duration_ms")]
    pub stale_after: Duration,
    /// Maximum hops followed by transitive dependent queries
    pub max_depth: usize,
    /// Scan imports and keep the dependency graph up to date
    pub track_dependencies: bool,
    /// Report added, removed and modified top-level definitions per change
    pub track_definitions: bool,
    /// Seed fingerprints for every eligible file at startup
    pub prepopulate_fingerprints: bool,
    /// Parse a file before reloading it and skip on syntax errors
    pub validate_syntax: bool,
    /// Globs (relative to the root) a change must match
    pub watch_patterns: Vec<String>,
    /// Globs (relative to the root) that are never watched
    pub ignore_patterns: Vec<String>,
    /// File extensions eligible for fingerprint pre-population
    pub hash_extensions: Vec<String>,
    /// Files (relative to the root) handled by the special reload-and-rebind path
    pub special_files: Vec<PathBuf>,
    /// Directories (relative to the root) holding shared utility modules
    pub shared_dirs: Vec<PathBuf>,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            namespace: None,
            tracked_prefixes: Vec::new(),
            debounce: Duration::from_millis(500),
            settle_delay: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            cleanup_threshold: 1000,
            cleanup_interval: Duration::from_secs(300),
            stale_after: Duration::from_secs(3600),
            max_depth: 10,
            track_dependencies: true,
            track_definitions: false,
            prepopulate_fingerprints: true,
            validate_syntax: true,
            watch_patterns: vec!["**/*.py".to_string()],
            ignore_patterns: vec![
                "**/__pycache__/**".to_string(),
                "**/*.pyc".to_string(),
                "**/.*".to_string(),
                "**/*~".to_string(),
                "**/*.swp".to_string(),
                "**/*.tmp".to_string(),
            ],
            hash_extensions: vec!["py".to_string()],
            special_files: Vec::new(),
            shared_dirs: vec![PathBuf::from("utils")],
        }
    }
}

impl HotReloadConfig {
    /// Create a configuration for a managed root with default settings
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Load from a file, layering `HOTWIRE__*` environment overrides on top
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = detect_format(path)?;

        let config: Self = Cfg::builder()
            .add_source(File::from(path).format(format))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse from a string with an explicit format
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let config: Self = Cfg::builder()
            .add_source(File::from_str(content, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.debounce.is_zero() || self.debounce > Duration::from_secs(60) {
            return Err(ConfigError::InvalidDebounce(self.debounce));
        }
        if self.cleanup_threshold == 0 {
            return Err(ConfigError::InvalidCleanupThreshold(self.cleanup_threshold));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        self.namespace()?;
        WatchFilter::new(&self.root_dir, &self.watch_patterns, &self.ignore_patterns)?;
        Ok(())
    }

    /// Namespace of the managed root
    pub fn namespace(&self) -> ConfigResult<String> {
        if let Some(ns) = self.namespace.as_ref().filter(|ns| !ns.is_empty()) {
            return Ok(ns.clone());
        }
        self.root_dir
            .canonicalize()
            .unwrap_or_else(|_| self.root_dir.clone())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingNamespace(self.root_dir.clone()))
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Track absolute imports starting with `prefix` in addition to the namespace
    pub fn with_tracked_prefix(mut self, prefix: &str) -> Self {
        self.tracked_prefixes.push(prefix.to_string());
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the cleanup trigger (cache size threshold and interval)
    pub fn with_cleanup(mut self, threshold: usize, interval: Duration) -> Self {
        self.cleanup_threshold = threshold;
        self.cleanup_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_dependency_tracking(mut self, enabled: bool) -> Self {
        self.track_dependencies = enabled;
        self
    }

    pub fn with_definition_tracking(mut self, enabled: bool) -> Self {
        self.track_definitions = enabled;
        self
    }

    pub fn with_prepopulate(mut self, enabled: bool) -> Self {
        self.prepopulate_fingerprints = enabled;
        self
    }

    pub fn with_syntax_validation(mut self, enabled: bool) -> Self {
        self.validate_syntax = enabled;
        self
    }

    pub fn with_watch_patterns(mut self, patterns: &[&str]) -> Self {
        self.watch_patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn with_hash_extension(mut self, ext: &str) -> Self {
        self.hash_extensions.push(ext.to_string());
        self
    }

    /// Register a special file, relative to the root
    pub fn with_special_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.special_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Replace the shared utility directories, relative to the root
    pub fn with_shared_dirs<P: AsRef<Path>>(mut self, dirs: &[P]) -> Self {
        self.shared_dirs = dirs.iter().map(|d| d.as_ref().to_path_buf()).collect();
        self
    }
}

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

fn duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
