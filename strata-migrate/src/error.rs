//! Error types for the migration engine.

use strata_plan::{PlanError, ReferenceError};
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during dependency resolution and migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Plan parsing or editing error.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A reference could not be parsed or resolved.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// A dependency names nothing known to the graph.
    #[error("module not found: `{name}`{}", required_by_suffix(.required_by))]
    ModuleNotFound {
        /// The missing node.
        name: String,
        /// The node whose edge pointed at it.
        required_by: Option<String>,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency: {path}")]
    CircularDependency {
        /// The cycle, e.g. `a -> b -> a`.
        path: String,
    },

    /// A deploy script's header names a different change than its location,
    /// or declares itself as a revert or verify script.
    #[error("script `{script}` declares itself as `{declared}`")]
    HeaderMismatch {
        /// Change name derived from the script path.
        script: String,
        /// Kind and target from the declaration line.
        declared: String,
    },

    /// A deployed change cannot be reverted while another change requires it.
    #[error("cannot revert {change}: required by {dependent_project}:{dependent_change}")]
    RevertProtected {
        /// The change that was to be reverted.
        change: String,
        /// Project of the dependent ledger row.
        dependent_project: String,
        /// Change name of the dependent ledger row.
        dependent_change: String,
    },

    /// A script failed against the database.
    #[error("change `{change}` failed: {message}")]
    Execution {
        /// The failing change.
        change: String,
        /// Driver error message.
        message: String,
    },

    /// No package with this name in the workspace.
    #[error("package `{0}` not found in workspace")]
    PackageNotFound(String),

    /// A required script is missing.
    #[error("{kind} script for `{change}` not found")]
    ScriptNotFound {
        /// `deploy`, `revert`, or `verify`.
        kind: String,
        /// The change whose script is missing.
        change: String,
    },

    /// A package manifest could not be read.
    #[error("invalid package manifest `{path}`: {message}")]
    InvalidManifest {
        /// Manifest path.
        path: String,
        /// Parser message.
        message: String,
    },

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an execution error.
    pub fn execution(change: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            change: change.into(),
            message: message.into(),
        }
    }

    /// Create a module-not-found error.
    pub fn module_not_found(name: impl Into<String>, required_by: Option<&str>) -> Self {
        Self::ModuleNotFound {
            name: name.into(),
            required_by: required_by.map(str::to_string),
        }
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable error code for reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::Plan(_) => "PARSE_ERROR",
            Self::Reference(_) => "INVALID_REFERENCE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::ModuleNotFound { .. } => "MODULE_NOT_FOUND",
            Self::CircularDependency { .. } => "CIRCULAR_DEPENDENCY",
            Self::HeaderMismatch { .. } => "HEADER_MISMATCH",
            Self::RevertProtected { .. } => "REVERT_PROTECTED",
            Self::Execution { .. } => "EXECUTION_FAILED",
            Self::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            Self::ScriptNotFound { .. } => "SCRIPT_NOT_FOUND",
            Self::InvalidManifest { .. } => "INVALID_MANIFEST",
            Self::Other(_) => "MIGRATION_ERROR",
        }
    }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|r| format!(" (required by `{}`)", r))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revert_protected_display() {
        let err = MigrationError::RevertProtected {
            change: "schema".to_string(),
            dependent_project: "app".to_string(),
            dependent_change: "table".to_string(),
        };
        assert_eq!(err.to_string(), "cannot revert schema: required by app:table");
        assert_eq!(err.code(), "REVERT_PROTECTED");
    }

    #[test]
    fn test_module_not_found_display() {
        let err = MigrationError::module_not_found("missing", Some("users"));
        assert_eq!(
            err.to_string(),
            "module not found: `missing` (required by `users`)"
        );

        let err = MigrationError::module_not_found("missing", None);
        assert_eq!(err.to_string(), "module not found: `missing`");
    }

    #[test]
    fn test_plan_error_is_transparent() {
        let err: MigrationError = PlanError::MissingProject.into();
        assert!(err.to_string().contains("%project"));
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_execution_display() {
        let err = MigrationError::execution("tables/users", "relation exists");
        let msg = err.to_string();
        assert!(msg.contains("tables/users"));
        assert!(msg.contains("relation exists"));
    }
}
