//! Reload events and outcomes

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of one extension reload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadOutcome {
    /// The loader reloaded the extension.
    Reloaded,
    /// The extension was not loaded, so it was loaded instead.
    Loaded,
    /// The attempt was skipped before reaching the loader (e.g. syntax error).
    Skipped { reason: String },
    /// The loader failed.
    Failed { error: String },
}

impl ReloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reloaded | Self::Loaded)
    }
}

impl fmt::Display for ReloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadOutcome::Reloaded => write!(f, "reloaded"),
            ReloadOutcome::Loaded => write!(f, "loaded"),
            ReloadOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            ReloadOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Event broadcast by the engine
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ReloadEvent {
    /// A debounced change fired for a file
    ChangeDetected {
        path: PathBuf,
        module: Option<String>,
    },
    /// A single extension reload is starting
    ReloadStarted { extension: String },
    /// A single extension reload finished (successfully or not)
    ReloadCompleted {
        extension: String,
        outcome: ReloadOutcome,
        duration: Duration,
    },
    /// A module was re-executed directly through the registry
    ModuleReloaded { module: String, duration: Duration },
    /// A failed module reload was rolled back
    RollbackTriggered { module: String, reason: String },
    /// A batch reload finished
    BatchCompleted {
        attempted: usize,
        succeeded: usize,
        elapsed: Duration,
    },
    /// A new source file appeared under the watched root
    FileDiscovered { path: PathBuf },
    /// A tracked source file was removed
    FileRemoved {
        path: PathBuf,
        module: Option<String>,
    },
    /// Top-level definitions of a file changed
    DefinitionsChanged {
        path: PathBuf,
        added: Vec<String>,
        removed: Vec<String>,
        modified: Vec<String>,
    },
}
