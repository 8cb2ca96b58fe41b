//! Error types for plan parsing, plan mutation, and reference resolution.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for reference resolution.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Errors that can occur while parsing or editing a plan.
#[derive(Error, Debug, Diagnostic)]
pub enum PlanError {
    /// Error reading a plan file.
    #[error("failed to read plan file: {path}")]
    #[diagnostic(code(strata::plan::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A line did not match the change or tag grammar.
    #[error("syntax error: {message}")]
    #[diagnostic(code(strata::plan::syntax_error))]
    Syntax { message: String },

    /// A change or tag name broke the naming rules.
    #[error("invalid {kind} name `{name}`: {reason}")]
    #[diagnostic(code(strata::plan::invalid_name))]
    InvalidName {
        kind: String,
        name: String,
        reason: String,
    },

    /// A dependency token is not a well-formed reference.
    #[error("invalid dependency `{token}` of change `{change}`: {reason}")]
    #[diagnostic(code(strata::plan::invalid_dependency))]
    InvalidDependency {
        change: String,
        token: String,
        reason: String,
    },

    /// A change lists itself as a dependency.
    #[error("change `{change}` cannot depend on itself")]
    #[diagnostic(code(strata::plan::self_dependency))]
    SelfDependency { change: String },

    /// A change depends on a change that is not declared before it.
    #[error("change `{change}` depends on `{dependency}`, which is not declared earlier in the plan")]
    #[diagnostic(
        code(strata::plan::undeclared_dependency),
        help("dependencies must be declared above the changes that require them")
    )]
    UndeclaredDependency { change: String, dependency: String },

    /// Duplicate change or tag.
    #[error("duplicate {kind} `{name}`")]
    #[diagnostic(code(strata::plan::duplicate))]
    Duplicate { kind: String, name: String },

    /// A change referenced by name does not exist.
    #[error("change `{name}` not found in plan")]
    #[diagnostic(code(strata::plan::change_not_found))]
    ChangeNotFound { name: String },

    /// A tag referenced by name does not exist.
    #[error("tag `@{name}` not found in plan")]
    #[diagnostic(code(strata::plan::tag_not_found))]
    TagNotFound { name: String },

    /// A change cannot be removed while something still points at it.
    #[error("change `{name}` is still referenced by {used_by}")]
    #[diagnostic(code(strata::plan::change_in_use))]
    ChangeInUse { name: String, used_by: String },

    /// An implicit tag was declared before any change.
    #[error("tag `@{tag}` has no change to attach to")]
    #[diagnostic(code(strata::plan::orphan_tag))]
    OrphanTag { tag: String },

    /// The plan has no `%project` pragma.
    #[error("plan is missing the `%project` pragma")]
    #[diagnostic(code(strata::plan::missing_project))]
    MissingProject,

    /// An error tied to a line of plan text.
    #[error("line {line}: {source}")]
    #[diagnostic(code(strata::plan::line))]
    Line {
        line: usize,
        #[source]
        source: Box<PlanError>,
    },

    /// Parsing produced one or more errors.
    #[error("plan parsing failed with {count} error(s)")]
    #[diagnostic(code(strata::plan::parse_failed))]
    ParseFailed {
        count: usize,
        #[related]
        errors: Vec<PlanError>,
    },
}

impl PlanError {
    /// Create an invalid name error.
    pub fn invalid_name(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidName {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid dependency error.
    pub fn invalid_dependency(
        change: impl Into<String>,
        token: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDependency {
            change: change.into(),
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate definition error.
    pub fn duplicate(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Attach a line number to this error.
    pub fn at_line(self, line: usize) -> Self {
        Self::Line {
            line,
            source: Box::new(self),
        }
    }

    /// The line number this error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Line { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Line-level errors carried by a failed parse (or this error alone).
    pub fn errors(&self) -> Vec<&PlanError> {
        match self {
            Self::ParseFailed { errors, .. } => errors.iter().collect(),
            other => vec![other],
        }
    }
}

/// Errors produced while tokenizing or resolving a change reference.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ReferenceError {
    /// The token is not a valid reference.
    #[error("invalid reference `{token}`: {reason}")]
    #[diagnostic(code(strata::reference::invalid))]
    Invalid { token: String, reason: String },

    /// Bare change name not present in the plan.
    #[error("change not found: `{name}`")]
    #[diagnostic(code(strata::reference::change_not_found))]
    ChangeNotFound { name: String },

    /// Tag not present in the plan.
    #[error("tag not found: `@{name}`")]
    #[diagnostic(code(strata::reference::tag_not_found))]
    TagNotFound { name: String },

    /// A relative walk left the bounds of the plan.
    #[error("reference `{reference}` is out of range: offset {offset} from position {position} in a plan of {len} change(s)")]
    #[diagnostic(code(strata::reference::out_of_range))]
    OutOfRange {
        reference: String,
        offset: i64,
        position: usize,
        len: usize,
    },

    /// The base of a relative reference does not name a change in this plan.
    #[error("cannot walk relative to `{reference}`")]
    #[diagnostic(code(strata::reference::not_walkable))]
    NotWalkable { reference: String },
}

impl ReferenceError {
    /// Create an invalid reference error.
    pub fn invalid(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[allow(unused_assignments)]
mod tests {
    use super::*;

    #[test]
    fn test_line_error_display() {
        let err = PlanError::invalid_name("change", "a:b", "contains `:`").at_line(7);
        let display = err.to_string();
        assert!(display.starts_with("line 7:"));
        assert!(display.contains("a:b"));
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn test_parse_failed_errors() {
        let err = PlanError::ParseFailed {
            count: 2,
            errors: vec![
                PlanError::MissingProject.at_line(1),
                PlanError::duplicate("change", "users").at_line(4),
            ],
        };

        assert!(err.to_string().contains("2 error(s)"));
        let lines: Vec<_> = err.errors().iter().filter_map(|e| e.line()).collect();
        assert_eq!(lines, vec![1, 4]);
    }

    #[test]
    fn test_single_error_errors() {
        let err = PlanError::MissingProject;
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_dependency_error_display() {
        let err = PlanError::invalid_dependency("tables/users", "a b", "contains whitespace");
        let display = err.to_string();
        assert!(display.contains("tables/users"));
        assert!(display.contains("a b"));
    }

    #[test]
    fn test_reference_error_display() {
        let err = ReferenceError::OutOfRange {
            reference: "HEAD^5".to_string(),
            offset: -5,
            position: 2,
            len: 3,
        };
        let display = err.to_string();
        assert!(display.contains("HEAD^5"));
        assert!(display.contains("-5"));

        let err = ReferenceError::TagNotFound {
            name: "v1.0".to_string(),
        };
        assert!(err.to_string().contains("@v1.0"));
    }
}
