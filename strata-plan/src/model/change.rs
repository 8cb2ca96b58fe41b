//! Change and tag entries of a plan.

use chrono::{DateTime, Utc};

/// Who made an entry, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// When the entry was planned.
    pub timestamp: Option<DateTime<Utc>>,
    /// Planner name.
    pub author: Option<String>,
    /// Planner email (without angle brackets).
    pub email: Option<String>,
    /// Free-form note following `#`.
    pub comment: Option<String>,
}

impl Signature {
    /// Create a signature stamped with the current time.
    pub fn now(author: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            author: Some(author.into()),
            email: Some(email.into()),
            comment: None,
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none()
            && self.author.is_none()
            && self.email.is_none()
            && self.comment.is_none()
    }
}

/// A named, ordered unit of schema modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Path-like change name, unique within the plan.
    pub name: String,
    /// Dependency tokens as written in the plan.
    pub dependencies: Vec<String>,
    /// Planner metadata.
    pub signature: Signature,
}

impl Change {
    /// Create a change without dependencies or metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            signature: Signature::default(),
        }
    }

    /// Add a dependency token.
    pub fn requires(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Set the signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// When the change was planned.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.signature.timestamp
    }

    /// Planner note.
    pub fn comment(&self) -> Option<&str> {
        self.signature.comment.as_deref()
    }
}

/// A named alias for the plan state up to and including `change`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag name without the leading `@`.
    pub name: String,
    /// The change this tag points at.
    pub change: String,
    /// Planner metadata.
    pub signature: Signature,
}

impl Tag {
    /// Create a tag pointing at `change`.
    pub fn new(name: impl Into<String>, change: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            change: change.into(),
            signature: Signature::default(),
        }
    }

    /// Set the signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}
