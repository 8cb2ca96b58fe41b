//! The plan: a package's ordered declaration of changes and tags.

use indexmap::IndexMap;

use crate::error::{PlanError, PlanResult};
use crate::model::{Change, Tag};
use crate::names::{validate_change_name, validate_tag_name};
use crate::reference::Reference;

/// Pragma holding the package name.
pub const PROJECT_PRAGMA: &str = "project";
/// Pragma holding the package URI.
pub const URI_PRAGMA: &str = "uri";
/// Pragma holding the plan syntax version.
pub const SYNTAX_VERSION_PRAGMA: &str = "syntax-version";
/// Syntax version written for new plans.
pub const SYNTAX_VERSION: &str = "1.0.0";

/// A package's ordered declaration of changes and tags.
///
/// Change order is the declared deployment order. Tags are kept ordered by
/// the position of the change they point at, ties in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Package name (`%project`).
    pub package: String,
    /// Package URI (`%uri`).
    pub uri: Option<String>,
    /// Remaining pragmas, e.g. `syntax-version`.
    pub pragmas: IndexMap<String, String>,
    changes: Vec<Change>,
    tags: Vec<Tag>,
}

impl Plan {
    /// Create an empty plan for `package`.
    pub fn new(package: impl Into<String>) -> Self {
        let mut pragmas = IndexMap::new();
        pragmas.insert(SYNTAX_VERSION_PRAGMA.to_string(), SYNTAX_VERSION.to_string());
        Self {
            package: package.into(),
            uri: None,
            pragmas,
            changes: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Set the URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// All changes in declaration order.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// All tags, ordered by the change they point at.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the plan declares no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Look up a change by name.
    pub fn change(&self, name: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.name == name)
    }

    /// Position of a change in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.changes.iter().position(|c| c.name == name)
    }

    /// Whether a change is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Look up a tag by name (without `@`).
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    /// Tags pointing at `change`.
    pub fn tags_for<'a>(&'a self, change: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.change == change)
    }

    /// The last declared change.
    pub fn head(&self) -> Option<&Change> {
        self.changes.last()
    }

    /// The first declared change.
    pub fn root(&self) -> Option<&Change> {
        self.changes.first()
    }

    /// Names of all changes, in order.
    pub fn change_names(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.name.as_str()).collect()
    }

    /// Append a change, validating its name and dependency tokens.
    pub fn add_change(&mut self, change: Change) -> PlanResult<()> {
        validate_change_name(&change.name)?;

        if self.contains(&change.name) {
            return Err(PlanError::duplicate("change", &change.name));
        }

        for token in &change.dependencies {
            self.check_dependency(&change.name, token)?;
        }

        self.changes.push(change);
        Ok(())
    }

    /// Add a tag, keeping tags ordered by the position of their change.
    pub fn add_tag(&mut self, tag: Tag) -> PlanResult<()> {
        validate_tag_name(&tag.name)?;

        if self.tag(&tag.name).is_some() {
            return Err(PlanError::duplicate("tag", &tag.name));
        }

        let position = self
            .position(&tag.change)
            .ok_or_else(|| PlanError::ChangeNotFound {
                name: tag.change.clone(),
            })?;

        let index = self
            .tags
            .iter()
            .position(|t| self.position(&t.change).is_some_and(|p| p > position))
            .unwrap_or(self.tags.len());
        self.tags.insert(index, tag);
        Ok(())
    }

    /// Remove a tag by name.
    pub fn remove_tag(&mut self, name: &str) -> PlanResult<Tag> {
        let index = self
            .tags
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| PlanError::TagNotFound {
                name: name.to_string(),
            })?;
        Ok(self.tags.remove(index))
    }

    /// Remove a change that nothing else refers to.
    pub fn remove_change(&mut self, name: &str) -> PlanResult<Change> {
        let index = self.position(name).ok_or_else(|| PlanError::ChangeNotFound {
            name: name.to_string(),
        })?;

        if let Some(dependent) = self
            .changes
            .iter()
            .find(|c| c.dependencies.iter().any(|d| self.names_local_change(d, name)))
        {
            return Err(PlanError::ChangeInUse {
                name: name.to_string(),
                used_by: format!("change `{}`", dependent.name),
            });
        }

        if let Some(tag) = self.tags.iter().find(|t| t.change == name) {
            return Err(PlanError::ChangeInUse {
                name: name.to_string(),
                used_by: format!("tag `@{}`", tag.name),
            });
        }

        Ok(self.changes.remove(index))
    }

    /// Rename a change, rewriting dependencies and tags that point at it.
    pub fn rename_change(&mut self, from: &str, to: &str) -> PlanResult<()> {
        validate_change_name(to)?;

        let index = self.position(from).ok_or_else(|| PlanError::ChangeNotFound {
            name: from.to_string(),
        })?;

        if self.contains(to) {
            return Err(PlanError::duplicate("change", to));
        }

        let package = self.package.clone();
        self.changes[index].name = to.to_string();

        for change in &mut self.changes {
            for token in &mut change.dependencies {
                if let Ok(reference) = Reference::parse(token)
                    && let Some(renamed) = reference.rename_change(&package, from, to)
                {
                    *token = renamed.to_string();
                }
            }
        }

        for tag in &mut self.tags {
            if tag.change == from {
                tag.change = to.to_string();
            }
        }

        Ok(())
    }

    /// Whether `token` names the local change `name`.
    fn names_local_change(&self, token: &str, name: &str) -> bool {
        Reference::parse(token)
            .ok()
            .and_then(|r| r.local_change_name(&self.package).map(str::to_string))
            .is_some_and(|n| n == name)
    }

    fn check_dependency(&self, change: &str, token: &str) -> PlanResult<()> {
        let reference = Reference::parse(token)
            .map_err(|e| PlanError::invalid_dependency(change, token, e.to_string()))?;

        if let Some(name) = reference.local_change_name(&self.package) {
            if name == change {
                return Err(PlanError::SelfDependency {
                    change: change.to_string(),
                });
            }
            if !self.contains(name) {
                return Err(PlanError::UndeclaredDependency {
                    change: change.to_string(),
                    dependency: token.to_string(),
                });
            }
        }

        Ok(())
    }
}
