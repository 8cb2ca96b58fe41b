//! Script and plan file access.
//!
//! The engine never touches the filesystem directly; it goes through a
//! [`ScriptSource`]. [`FsScriptSource`] reads a package tree on disk and
//! [`MemoryScriptSource`] serves files from a map, which keeps engine tests
//! free of fixtures.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::{MigrateResult, MigrationError};

/// Script file extension.
pub const SCRIPT_EXTENSION: &str = "sql";

/// The three per-change script kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// Applies the change.
    Deploy,
    /// Undoes the change.
    Revert,
    /// Checks the change took effect.
    Verify,
}

impl ScriptKind {
    /// Directory holding scripts of this kind.
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Revert => "revert",
            Self::Verify => "verify",
        }
    }

    /// Capitalized name used in script headers.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Deploy => "Deploy",
            Self::Revert => "Revert",
            Self::Verify => "Verify",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

impl FromStr for ScriptKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deploy" => Ok(Self::Deploy),
            "revert" => Ok(Self::Revert),
            "verify" => Ok(Self::Verify),
            other => Err(MigrationError::other(format!("unknown script kind `{}`", other))),
        }
    }
}

/// Path of a change's script under a package root.
pub fn script_path(base: &Path, kind: ScriptKind, change: &str) -> PathBuf {
    base.join(kind.dir())
        .join(format!("{}.{}", change, SCRIPT_EXTENSION))
}

/// SHA-256 of script content, hex encoded.
pub fn script_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read access to plans and scripts.
pub trait ScriptSource: Send + Sync {
    /// Read plan text.
    fn read_plan(&self, path: &Path) -> MigrateResult<String>;

    /// Read a change's script; `Ok(None)` when it does not exist.
    fn read_script(
        &self,
        base: &Path,
        kind: ScriptKind,
        change: &str,
    ) -> MigrateResult<Option<String>>;

    /// Change names of every script of `kind` under `base`, sorted.
    fn list_scripts(&self, base: &Path, kind: ScriptKind) -> MigrateResult<Vec<String>>;
}

/// Reads scripts from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsScriptSource;

impl FsScriptSource {
    /// Create a filesystem source.
    pub fn new() -> Self {
        Self
    }
}

impl ScriptSource for FsScriptSource {
    fn read_plan(&self, path: &Path) -> MigrateResult<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn read_script(
        &self,
        base: &Path,
        kind: ScriptKind,
        change: &str,
    ) -> MigrateResult<Option<String>> {
        let path = script_path(base, kind, change);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MigrationError::Io(e)),
        }
    }

    fn list_scripts(&self, base: &Path, kind: ScriptKind) -> MigrateResult<Vec<String>> {
        let root = base.join(kind.dir());
        let mut names = Vec::new();

        if !root.is_dir() {
            return Ok(names);
        }

        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Some(name) = change_name(&root, &path) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Serves plans and scripts from memory, keyed by full path.
#[derive(Debug, Default)]
pub struct MemoryScriptSource {
    files: RwLock<BTreeMap<PathBuf, String>>,
}

impl MemoryScriptSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    /// Add or replace a change's script.
    pub fn insert_script(
        &self,
        base: &Path,
        kind: ScriptKind,
        change: &str,
        content: impl Into<String>,
    ) {
        self.insert(script_path(base, kind, change), content);
    }

    /// Remove a file; returns whether it existed.
    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().remove(path).is_some()
    }
}

impl ScriptSource for MemoryScriptSource {
    fn read_plan(&self, path: &Path) -> MigrateResult<String> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            MigrationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    fn read_script(
        &self,
        base: &Path,
        kind: ScriptKind,
        change: &str,
    ) -> MigrateResult<Option<String>> {
        Ok(self
            .files
            .read()
            .get(&script_path(base, kind, change))
            .cloned())
    }

    fn list_scripts(&self, base: &Path, kind: ScriptKind) -> MigrateResult<Vec<String>> {
        let root = base.join(kind.dir());
        // BTreeMap order over paths is not the order of the `/`-joined names.
        let mut names: Vec<_> = self
            .files
            .read()
            .keys()
            .filter_map(|path| change_name(&root, path))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// `root/a/b.sql` → `a/b`.
fn change_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.extension()? != SCRIPT_EXTENSION {
        return None;
    }

    let stem = relative.with_extension("");
    let parts: Vec<_> = stem
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_script_hash_is_sha256() {
        assert_eq!(
            script_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(script_hash("SELECT 1;"), script_hash("SELECT 2;"));
    }

    #[test]
    fn test_script_kind_parse() {
        assert_eq!("Deploy".parse::<ScriptKind>().unwrap(), ScriptKind::Deploy);
        assert_eq!("verify".parse::<ScriptKind>().unwrap(), ScriptKind::Verify);
        assert!("undo".parse::<ScriptKind>().is_err());
    }

    #[test]
    fn test_fs_source() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("deploy/schemas/app")).unwrap();
        std::fs::write(base.join("deploy/schemas/app.sql"), "CREATE SCHEMA app;").unwrap();
        std::fs::write(base.join("deploy/schemas/app/users.sql"), "CREATE TABLE u();").unwrap();
        std::fs::write(base.join("deploy/README.md"), "not a script").unwrap();

        let source = FsScriptSource::new();
        assert_eq!(
            source.list_scripts(base, ScriptKind::Deploy).unwrap(),
            vec!["schemas/app", "schemas/app/users"]
        );
        assert_eq!(
            source
                .read_script(base, ScriptKind::Deploy, "schemas/app")
                .unwrap()
                .as_deref(),
            Some("CREATE SCHEMA app;")
        );
        assert_eq!(
            source.read_script(base, ScriptKind::Revert, "schemas/app").unwrap(),
            None
        );
        assert!(source.list_scripts(base, ScriptKind::Verify).unwrap().is_empty());
    }

    #[test]
    fn test_memory_source() {
        let source = MemoryScriptSource::new();
        let base = Path::new("/ws/app");
        source.insert_script(base, ScriptKind::Deploy, "schema", "CREATE SCHEMA app;");
        source.insert_script(base, ScriptKind::Deploy, "schema/users", "CREATE TABLE u();");
        source.insert_script(base, ScriptKind::Deploy, "schema-extra", "SELECT 1;");
        source.insert_script(base, ScriptKind::Revert, "schema", "DROP SCHEMA app;");
        source.insert("/ws/app/strata.plan", "%project=app\n");

        assert_eq!(
            source.list_scripts(base, ScriptKind::Deploy).unwrap(),
            vec!["schema", "schema-extra", "schema/users"]
        );
        assert!(source.read_plan(Path::new("/ws/app/strata.plan")).is_ok());
        assert!(source.read_plan(Path::new("/ws/other/strata.plan")).is_err());
        assert!(
            source
                .read_script(base, ScriptKind::Verify, "schema")
                .unwrap()
                .is_none()
        );
    }
}
