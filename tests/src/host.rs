use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use hotwire_kernel::{
    ExtensionLoader, LoaderError, ModuleError, ModuleObject, ModuleRegistry, SpecialReloadHook,
};
use parking_lot::Mutex;

/// One call received by [`RecordingLoader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderCall {
    Load(String),
    Reload(String),
}

/// Extension loader that tracks a loaded set and records every call.
///
/// Names are compared verbatim, so tests control which form (long or short)
/// the engine sees.
#[derive(Debug, Default)]
pub struct RecordingLoader {
    loaded: Mutex<Vec<String>>,
    paths: Mutex<HashMap<String, PathBuf>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<LoaderCall>>,
}

impl RecordingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaded(self, name: &str) -> Self {
        self.loaded.lock().push(name.to_string());
        self
    }

    /// Report `path` as the extension's source file
    pub fn with_path(self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.paths.lock().insert(name.to_string(), path.into());
        self
    }

    /// Make loads and reloads of `name` fail with `message`
    pub fn failing_on(self, name: &str, message: &str) -> Self {
        self.fail(name, message);
        self
    }

    pub fn fail(&self, name: &str, message: &str) {
        self.failures
            .lock()
            .insert(name.to_string(), message.to_string());
    }

    pub fn unload(&self, name: &str) {
        self.loaded.lock().retain(|n| n != name);
    }

    pub fn calls(&self) -> Vec<LoaderCall> {
        self.calls.lock().clone()
    }

    /// Extensions that received a reload call, in call order
    pub fn reloaded(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                LoaderCall::Reload(name) => Some(name.clone()),
                LoaderCall::Load(_) => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn failure(&self, name: &str) -> Option<LoaderError> {
        self.failures
            .lock()
            .get(name)
            .map(|message| LoaderError::failed(name, message.clone()))
    }
}

#[async_trait]
impl ExtensionLoader for RecordingLoader {
    async fn loaded_extensions(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }

    fn extension_path(&self, name: &str) -> Option<PathBuf> {
        self.paths.lock().get(name).cloned()
    }

    async fn load_extension(&self, name: &str) -> Result<(), LoaderError> {
        self.calls.lock().push(LoaderCall::Load(name.to_string()));
        if let Some(err) = self.failure(name) {
            return Err(err);
        }
        let mut loaded = self.loaded.lock();
        if !loaded.iter().any(|n| n == name) {
            loaded.push(name.to_string());
        }
        Ok(())
    }

    async fn reload_extension(&self, name: &str) -> Result<(), LoaderError> {
        self.calls.lock().push(LoaderCall::Reload(name.to_string()));
        if !self.loaded.lock().iter().any(|n| n == name) {
            return Err(LoaderError::NotLoaded(name.to_string()));
        }
        match self.failure(name) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Marker value stored by [`InMemoryRegistry`] when a reload fails midway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial;

/// Value stored for a successfully reloaded module: its reload generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(pub u32);

/// Module registry backed by a map.
///
/// A failing reload leaves a [`Partial`] entry behind, like an interpreter
/// that registers a module before executing its body.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    modules: Mutex<BTreeMap<String, ModuleObject>>,
    failures: Mutex<HashMap<String, String>>,
    generations: Mutex<HashMap<String, u32>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module: ModuleObject) {
        self.modules.lock().insert(module.name().to_string(), module);
    }

    pub fn fail_on(&self, name: &str, message: &str) {
        self.failures
            .lock()
            .insert(name.to_string(), message.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.lock().keys().cloned().collect()
    }

    /// How many times `name` was successfully re-executed
    pub fn generation(&self, name: &str) -> u32 {
        self.generations.lock().get(name).copied().unwrap_or(0)
    }
}

impl ModuleRegistry for InMemoryRegistry {
    fn get(&self, name: &str) -> Option<ModuleObject> {
        self.modules.lock().get(name).cloned()
    }

    fn set(&self, name: &str, module: ModuleObject) {
        self.modules.lock().insert(name.to_string(), module);
    }

    fn remove(&self, name: &str) -> Option<ModuleObject> {
        self.modules.lock().remove(name)
    }

    fn reload_in_place(
        &self,
        name: &str,
        current: Option<&ModuleObject>,
    ) -> Result<ModuleObject, ModuleError> {
        if let Some(message) = self.failures.lock().get(name).cloned() {
            self.set(name, ModuleObject::new(name, Partial));
            return Err(ModuleError::execution_failed(name, message));
        }

        let generation = {
            let mut generations = self.generations.lock();
            let entry = generations.entry(name.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let fresh = ModuleObject::new(name, Generation(generation));
        Ok(match current.and_then(ModuleObject::origin) {
            Some(origin) => fresh.with_origin(origin),
            None => fresh,
        })
    }

    fn modules(&self) -> Vec<ModuleObject> {
        self.modules.lock().values().cloned().collect()
    }
}

/// Rebind hook that records the modules it was called with
#[derive(Debug, Default)]
pub struct RecordingHook {
    rebinds: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            rebinds: Mutex::new(Vec::new()),
            failure: Mutex::new(Some(message.to_string())),
        }
    }

    pub fn rebinds(&self) -> Vec<String> {
        self.rebinds.lock().clone()
    }
}

#[async_trait]
impl SpecialReloadHook for RecordingHook {
    async fn rebind(&self, module: &ModuleObject) -> Result<(), LoaderError> {
        self.rebinds.lock().push(module.name().to_string());
        match self.failure.lock().clone() {
            Some(message) => Err(LoaderError::failed(module.name(), message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reload_of_unloaded_extension_reports_not_loaded() {
        let loader = RecordingLoader::new().with_loaded("cogs.admin");

        assert!(loader.reload_extension("cogs.admin").await.is_ok());
        let err = loader.reload_extension("cogs.music").await.unwrap_err();
        assert!(err.is_not_loaded());

        loader.load_extension("cogs.music").await.unwrap();
        assert_eq!(
            loader.loaded_extensions().await,
            vec!["cogs.admin".to_string(), "cogs.music".to_string()]
        );
        assert_eq!(
            loader.calls(),
            vec![
                LoaderCall::Reload("cogs.admin".into()),
                LoaderCall::Reload("cogs.music".into()),
                LoaderCall::Load("cogs.music".into()),
            ]
        );
    }

    #[test]
    fn failing_reload_leaves_partial_entry() {
        let registry = InMemoryRegistry::new();
        registry.insert(ModuleObject::new("bot.utils", Generation(0)));
        registry.fail_on("bot.utils", "NameError");

        let current = registry.get("bot.utils");
        assert!(registry.reload_in_place("bot.utils", current.as_ref()).is_err());

        let entry = registry.get("bot.utils").unwrap();
        assert!(entry.downcast_ref::<Partial>().is_some());
    }

    #[test]
    fn successful_reload_bumps_generation() {
        let registry = InMemoryRegistry::new();
        let fresh = registry.reload_in_place("bot.utils", None).unwrap();
        assert_eq!(fresh.downcast_ref::<Generation>(), Some(&Generation(1)));
        assert_eq!(registry.generation("bot.utils"), 1);
        // the registry itself is only updated by the caller
        assert!(!registry.contains("bot.utils"));
    }
}
