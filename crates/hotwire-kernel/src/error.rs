//! Typed errors for the hot-reload sub-system.
//!
//! [`HotReloadError`] is the crate-level error used with
//! [`error_stack::Report`] on the few paths that are allowed to fail the
//! engine (configuration and OS watch resources). The narrower
//! [`LoaderError`] and [`ModuleError`] are what host implementations return;
//! the engine recovers from both locally.

use thiserror::Error;

/// Crate-level error kinds.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HotReloadError {
    /// Invalid configuration, detected at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The OS watch resource failed to start or stop.
    #[error("Watch error: {0}")]
    Watch(String),

    /// A source file could not be parsed or an import could not be resolved.
    #[error("Dependency resolution error: {0}")]
    Dependency(String),

    /// A direct module reload failed (after rollback).
    #[error("Module reload error: {0}")]
    ModuleReload(#[from] ModuleError),

    /// The host loader failed for one extension.
    #[error("Extension reload error: {0}")]
    ExtensionReload(#[from] LoaderError),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type HotReloadResult<T> = Result<T, error_stack::Report<HotReloadError>>;

/// Errors reported by an [`ExtensionLoader`](crate::ExtensionLoader).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoaderError {
    /// The extension is not currently loaded, so it cannot be reloaded.
    #[error("Extension not loaded: {0}")]
    NotLoaded(String),

    /// The host does not know any extension with that name.
    #[error("Extension not found: {0}")]
    NotFound(String),

    /// Loading, reloading or rebinding raised inside the host.
    #[error("Extension {name} failed: {message}")]
    Failed { name: String, message: String },
}

impl LoaderError {
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True when the loader refused a reload because the extension was never loaded.
    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded(_))
    }
}

/// Errors reported by a [`ModuleRegistry`](crate::ModuleRegistry).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("Module not found: {0}")]
    NotFound(String),

    /// Executing the fresh module body raised.
    #[error("Module {name} failed to execute: {message}")]
    ExecutionFailed { name: String, message: String },
}

impl ModuleError {
    pub fn execution_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::{Report, ResultExt};

    #[test]
    fn loader_error_converts_via_from() {
        let err: HotReloadError = LoaderError::NotLoaded("bot.cogs.admin".into()).into();

        assert!(matches!(err, HotReloadError::ExtensionReload(_)));
        assert!(err.to_string().contains("bot.cogs.admin"));
    }

    #[test]
    fn module_error_converts_via_from() {
        let err: HotReloadError = ModuleError::execution_failed("bot.utils", "boom").into();

        assert!(matches!(err, HotReloadError::ModuleReload(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn not_loaded_is_distinguished() {
        assert!(LoaderError::NotLoaded("x".into()).is_not_loaded());
        assert!(!LoaderError::failed("x", "import error").is_not_loaded());
        assert!(!LoaderError::NotFound("x".into()).is_not_loaded());
    }

    #[test]
    fn report_carries_context() {
        let result: HotReloadResult<()> =
            Err(Report::new(HotReloadError::Config("debounce must be positive".into())))
                .attach("while building the reload manager");

        let display = format!("{:?}", result.unwrap_err());
        assert!(display.contains("debounce must be positive"));
        assert!(display.contains("while building the reload manager"));
    }
}
