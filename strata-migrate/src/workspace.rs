//! Packages and the workspace that holds them.
//!
//! A workspace is a directory whose immediate subdirectories are packages.
//! Each package has a `strata.package.toml` manifest:
//!
//! ```toml
//! name = "app"
//! requires = ["auth", "pgcrypto"]
//! ```
//!
//! Requirements naming another package in the workspace are package
//! dependencies; anything else is a native database extension.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::file::ScriptKind;

/// Package manifest file name.
pub const MANIFEST_FILE: &str = "strata.package.toml";

/// Plan file name inside a package.
pub const PLAN_FILE: &str = "strata.plan";

/// Contents of `strata.package.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Package name, matching the plan's `%project`.
    pub name: String,
    /// Packages and extensions this package needs.
    #[serde(default)]
    pub requires: Vec<String>,
}

/// A package located in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Package name.
    pub name: String,
    /// Package directory.
    pub root: PathBuf,
    /// Manifest requirements.
    pub requires: Vec<String>,
}

impl PackageInfo {
    /// Create a package without requirements.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            requires: Vec::new(),
        }
    }

    /// Add a requirement.
    pub fn requires(mut self, requirement: impl Into<String>) -> Self {
        self.requires.push(requirement.into());
        self
    }

    /// Path of the package plan.
    pub fn plan_path(&self) -> PathBuf {
        self.root.join(PLAN_FILE)
    }

    /// Directory holding scripts of `kind`.
    pub fn script_dir(&self, kind: ScriptKind) -> PathBuf {
        self.root.join(kind.dir())
    }
}

/// All packages under a workspace root.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    root: PathBuf,
    packages: IndexMap<String, PackageInfo>,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            packages: IndexMap::new(),
        }
    }

    /// Add a package, replacing one with the same name.
    pub fn with_package(mut self, package: PackageInfo) -> Self {
        self.add_package(package);
        self
    }

    /// Add a package, replacing one with the same name.
    pub fn add_package(&mut self, package: PackageInfo) {
        self.packages.insert(package.name.clone(), package);
    }

    /// Discover packages in `root` and its immediate subdirectories.
    pub fn discover(root: impl AsRef<Path>) -> MigrateResult<Self> {
        let root = root.as_ref();
        let mut workspace = Self::new(root);

        let mut dirs = vec![root.to_path_buf()];
        let mut children: Vec<_> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        children.sort();
        dirs.extend(children);

        for dir in dirs {
            let manifest_path = dir.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }

            let manifest = load_manifest(&manifest_path)?;
            debug!(package = %manifest.name, path = %dir.display(), "Found package");
            workspace.add_package(PackageInfo {
                name: manifest.name,
                root: dir,
                requires: manifest.requires,
            });
        }

        Ok(workspace)
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a package.
    pub fn package(&self, name: &str) -> MigrateResult<&PackageInfo> {
        self.packages
            .get(name)
            .ok_or_else(|| MigrationError::PackageNotFound(name.to_string()))
    }

    /// Whether a package exists.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// All packages in discovery order.
    pub fn packages(&self) -> impl Iterator<Item = &PackageInfo> {
        self.packages.values()
    }

    /// Map of package names to directories.
    pub fn package_dirs(&self) -> IndexMap<&str, &Path> {
        self.packages
            .values()
            .map(|p| (p.name.as_str(), p.root.as_path()))
            .collect()
    }

    /// Package whose directory contains `path`, deepest match first.
    pub fn package_at(&self, path: &Path) -> Option<&PackageInfo> {
        self.packages
            .values()
            .filter(|p| path.starts_with(&p.root))
            .max_by_key(|p| p.root.components().count())
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the workspace has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Read a package manifest.
pub fn load_manifest(path: &Path) -> MigrateResult<PackageManifest> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| MigrationError::InvalidManifest {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
