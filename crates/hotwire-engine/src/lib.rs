//! Hotwire engine
//!
//! Dependency-aware hot reload for a tree of Python source modules loaded
//! by a host application.
//!
//! A change flows through the engine as follows:
//! - [`SourceWatcher`] forwards OS notifications into the event loop
//! - [`ChangeDebouncer`] drops no-op saves and coalesces bursts per file
//! - [`ReloadOrchestrator`] classifies the file, consults the
//!   [`DependencyGraph`] and drives the host's
//!   [`ExtensionLoader`](hotwire_kernel::ExtensionLoader)
//!
//! [`HotReloadManager`] wires these together behind `start()` / `stop()`.

pub mod config;
pub mod debouncer;
pub mod definitions;
pub mod fingerprint;
pub mod graph;
pub mod manager;
pub mod orchestrator;
pub mod resolver;
pub mod syntax;
pub mod watcher;

pub use config::{ConfigError, ConfigResult, HotReloadConfig};
pub use debouncer::{ChangeDebouncer, DebounceDecision, FiredChange};
pub use definitions::{DefinitionDiff, DefinitionTracker};
pub use fingerprint::{ContentFingerprinter, fingerprint};
pub use graph::{DependencyGraph, GraphSettings};
pub use manager::HotReloadManager;
pub use orchestrator::{
    BatchReport, ChangeAction, ChangeReport, DependencyReport, EngineStats, ReloadOrchestrator,
    ReloadReport,
};
pub use resolver::PathResolver;
pub use syntax::{Definition, DefinitionKind, ImportStatement, ParseError, SourceParser};
pub use watcher::{RenameTracker, SourceWatcher, WatchEvent, WatchEventKind, WatchFilter};

pub use hotwire_kernel::{
    ExtensionLoader, HotReloadError, HotReloadResult, LoaderError, ModuleError, ModuleObject,
    ModuleRegistry, ReloadEvent, ReloadOutcome, SpanObserver, SpecialReloadHook,
};
