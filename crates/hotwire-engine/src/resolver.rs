//! Path ⇄ module name resolution
//!
//! The managed root is a package directory whose name (or the configured
//! namespace) is the first segment of every module name: with root
//! `/srv/app/bot`, `/srv/app/bot/cogs/admin.py` is `bot.cogs.admin` and
//! `/srv/app/bot/cogs/__init__.py` is `bot.cogs`. Hosts may name extensions
//! in the long form or in the short form without the namespace
//! (`cogs.admin`); both are accepted everywhere.

use std::path::{Component, Path, PathBuf};

pub const SOURCE_EXTENSION: &str = "py";
pub const PACKAGE_INIT: &str = "__init__.py";

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    namespace: String,
}

impl PathResolver {
    /// Resolver for `root`, whose modules live under `namespace`
    pub fn new(root: impl AsRef<Path>, namespace: impl Into<String>) -> Self {
        let root = root.as_ref();
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            namespace: namespace.into(),
        }
    }

    /// Canonical managed root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dotted prefix of every module under the root
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Directory that contains the managed root
    pub fn base_dir(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }

    /// Long form of a module name (`cogs.admin` -> `bot.cogs.admin`)
    pub fn canonical_name(&self, name: &str) -> String {
        if self.in_namespace(name) {
            name.to_string()
        } else {
            format!("{}.{}", self.namespace, name)
        }
    }

    /// Short form of a module name; the namespace itself stays as is
    pub fn short_name<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name)
    }

    /// Long-form `name` is the namespace or lies under it
    pub fn in_namespace(&self, name: &str) -> bool {
        is_under(name, &self.namespace)
    }

    fn segments(&self, name: &str) -> Vec<String> {
        let canonical = self.canonical_name(name);
        canonical
            .split('.')
            .skip(1)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Directory a (possibly package) module name corresponds to
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.segments(name)
            .iter()
            .fold(self.root.clone(), |dir, part| dir.join(part))
    }

    /// Source file of a module name.
    ///
    /// A package (`<dir>/__init__.py`) wins over a same-named module file.
    /// When neither exists the module file path is returned.
    pub fn path_from_extension(&self, name: &str) -> PathBuf {
        let dir = self.package_dir(name);
        let init = dir.join(PACKAGE_INIT);
        if init.is_file() || dir == self.root {
            return init;
        }
        let module = dir.with_extension(SOURCE_EXTENSION);
        if !module.is_file() && dir.is_dir() {
            return init;
        }
        module
    }

    /// Module name of a source file under the root, in long form
    pub fn extension_from_path(&self, path: &Path) -> Option<String> {
        self.module_name(path)
    }

    /// `None` for non-source files and paths outside the root
    pub fn module_name(&self, path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
            return None;
        }
        let relative = self.relative(path)?;

        let mut parts = vec![self.namespace.clone()];
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                _ => return None,
            }
        }

        let file = parts.pop()?;
        let stem = file.strip_suffix(".py")?;
        if stem.contains('.') {
            return None;
        }
        if stem != "__init__" {
            parts.push(stem.to_string());
        }
        Some(parts.join("."))
    }

    /// Whether `path` is a package's `__init__.py`
    pub fn is_package_root(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| n.to_str()) == Some(PACKAGE_INIT)
    }

    /// A module file or package for `name` exists on disk
    pub fn module_exists(&self, name: &str) -> bool {
        let dir = self.package_dir(name);
        dir.join(PACKAGE_INIT).is_file() || dir.with_extension(SOURCE_EXTENSION).is_file()
    }

    /// Resolve `from <level dots><module> import <name>` written in `file`.
    ///
    /// Returns `None` for absolute imports and for imports that climb above
    /// the managed root.
    pub fn resolve_relative(
        &self,
        file: &Path,
        level: usize,
        module: Option<&str>,
        name: Option<&str>,
    ) -> Option<String> {
        if level == 0 {
            return None;
        }
        let relative = self.relative(file)?;

        let mut parts: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str().map(str::to_string),
                _ => None,
            })
            .collect();

        let ascend = level - 1;
        if ascend > parts.len() {
            return None;
        }
        parts.truncate(parts.len() - ascend);

        if let Some(suffix) = module.filter(|m| !m.is_empty()).or(name) {
            parts.extend(suffix.split('.').map(str::to_string));
        }

        let mut name = self.namespace.clone();
        for part in parts {
            name.push('.');
            name.push_str(&part);
        }
        Some(name)
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        // the file may be gone; canonicalize through its parent
        let canonical = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => {
                let parent = path.parent()?.canonicalize().ok()?;
                parent.join(path.file_name()?)
            }
        };
        canonical
            .strip_prefix(&self.root)
            .ok()
            .map(Path::to_path_buf)
    }
}

/// `name` equals `package` or is nested under it
pub fn is_under(name: &str, package: &str) -> bool {
    name == package
        || name
            .strip_prefix(package)
            .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[&str]) -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("bot");
        std::fs::create_dir_all(&root).unwrap();
        for file in files {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }
        let resolver = PathResolver::new(&root, "bot");
        (dir, resolver)
    }

    #[test]
    fn module_names_from_paths() {
        let (_dir, r) = tree(&["__init__.py", "cogs/__init__.py", "cogs/admin.py"]);

        assert_eq!(r.module_name(&r.root().join("cogs/admin.py")).unwrap(), "bot.cogs.admin");
        assert_eq!(r.module_name(&r.root().join("cogs/__init__.py")).unwrap(), "bot.cogs");
        assert_eq!(r.module_name(&r.root().join("__init__.py")).unwrap(), "bot");
        assert!(r.module_name(&r.root().join("cogs/notes.txt")).is_none());
        assert!(r.module_name(Path::new("/elsewhere/x.py")).is_none());
    }

    #[test]
    fn package_dir_wins_over_module_file() {
        let (_dir, r) = tree(&["cogs/music.py", "cogs/music/__init__.py", "cogs/admin.py"]);

        assert_eq!(
            r.path_from_extension("bot.cogs.music"),
            r.root().join("cogs/music/__init__.py")
        );
        assert_eq!(r.path_from_extension("cogs.admin"), r.root().join("cogs/admin.py"));
        assert_eq!(r.path_from_extension("bot"), r.root().join("__init__.py"));
    }

    #[test]
    fn path_and_name_round_trip() {
        let (_dir, r) = tree(&["cogs/music/__init__.py", "cogs/music/player.py"]);
        for name in ["bot.cogs.music", "bot.cogs.music.player"] {
            let path = r.path_from_extension(name);
            assert_eq!(r.extension_from_path(&path).unwrap(), name);
        }
    }

    #[test]
    fn long_and_short_forms() {
        let (_dir, r) = tree(&[]);
        assert_eq!(r.canonical_name("cogs.admin"), "bot.cogs.admin");
        assert_eq!(r.canonical_name("bot.cogs.admin"), "bot.cogs.admin");
        assert_eq!(r.short_name("bot.cogs.admin"), "cogs.admin");
        assert_eq!(r.short_name("bot"), "bot");
        // `botany` is not under `bot`
        assert_eq!(r.canonical_name("botany"), "bot.botany");
    }

    #[test]
    fn relative_imports() {
        let (_dir, r) = tree(&["cogs/music/player.py", "cogs/music/__init__.py"]);
        let player = r.root().join("cogs/music/player.py");
        let init = r.root().join("cogs/music/__init__.py");

        assert_eq!(
            r.resolve_relative(&player, 1, Some("queue"), Some("Queue")).unwrap(),
            "bot.cogs.music.queue"
        );
        assert_eq!(
            r.resolve_relative(&player, 1, None, Some("queue")).unwrap(),
            "bot.cogs.music.queue"
        );
        assert_eq!(
            r.resolve_relative(&player, 3, Some("utils.db"), None).unwrap(),
            "bot.utils.db"
        );
        assert_eq!(
            r.resolve_relative(&init, 1, Some("player"), None).unwrap(),
            "bot.cogs.music.player"
        );
        assert!(r.resolve_relative(&player, 4, Some("outside"), None).is_none());
        assert!(r.resolve_relative(&player, 0, Some("os"), None).is_none());
    }

    #[test]
    fn nesting() {
        assert!(is_under("bot.cogs.music.player", "bot.cogs.music"));
        assert!(is_under("bot.cogs", "bot.cogs"));
        assert!(!is_under("bot.cogs_extra", "bot.cogs"));
    }
}
