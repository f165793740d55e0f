//! Host contracts
//!
//! The engine never touches the hosting application's globals directly. All
//! loader and module-registry access goes through these traits, which keeps
//! the reload protocol (and its rollback) testable with in-memory fakes.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LoaderError, ModuleError};

/// The host's extension loader.
///
/// Implementations are driven from the engine's single event-loop task, so
/// they never see two calls for the same extension at once from a single
/// debounced change.
#[async_trait::async_trait]
pub trait ExtensionLoader: Send + Sync {
    /// Names of the extensions currently loaded, in host order.
    async fn loaded_extensions(&self) -> Vec<String>;

    /// Backing source file for a loaded extension, when the host knows it.
    fn extension_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    /// Load an extension that is not loaded yet.
    async fn load_extension(&self, name: &str) -> Result<(), LoaderError>;

    /// Reload a loaded extension.
    ///
    /// Must return [`LoaderError::NotLoaded`] when the extension is not loaded,
    /// so the engine can fall back to [`load_extension`](Self::load_extension).
    async fn reload_extension(&self, name: &str) -> Result<(), LoaderError>;
}

/// The host's module registry (the table of imported modules).
pub trait ModuleRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<ModuleObject>;

    fn set(&self, name: &str, module: ModuleObject);

    fn remove(&self, name: &str) -> Option<ModuleObject>;

    /// Re-execute a module's source and return the fresh module object.
    ///
    /// `current` is `None` when the module is not registered yet. An
    /// implementation may leave a partially initialised entry behind when it
    /// fails; the engine restores the previous entry in that case.
    fn reload_in_place(
        &self,
        name: &str,
        current: Option<&ModuleObject>,
    ) -> Result<ModuleObject, ModuleError>;

    /// Snapshot of every registered module.
    fn modules(&self) -> Vec<ModuleObject>;
}

/// Rebind action run after a special file (e.g. the command registry) is
/// reloaded as a plain module.
#[async_trait::async_trait]
pub trait SpecialReloadHook: Send + Sync {
    async fn rebind(&self, module: &ModuleObject) -> Result<(), LoaderError>;
}

/// Opaque handle to a host module object.
///
/// Cloning is cheap and keeps identity: two clones compare equal under
/// [`ModuleObject::same_object`].
#[derive(Clone)]
pub struct ModuleObject {
    name: String,
    origin: Option<PathBuf>,
    value: Arc<dyn Any + Send + Sync>,
}

impl ModuleObject {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            origin: None,
            value: Arc::new(value),
        }
    }

    /// Set the source file the module was executed from
    pub fn with_origin<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.origin = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Identity comparison
    pub fn same_object(&self, other: &ModuleObject) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for ModuleObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleObject")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
