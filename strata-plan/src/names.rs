//! Naming rules shared by changes and tags.

use crate::error::{PlanError, PlanResult};

/// Characters that may never appear in a change or tag name.
const FORBIDDEN: [char; 4] = [':', '@', '#', '\\'];

/// Symbols that may not be followed by a trailing run of digits.
const SUFFIX_SYMBOLS: [char; 5] = ['~', '^', '/', '=', '%'];

/// What kind of name is being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// A change name (path-like, `/` allowed).
    Change,
    /// A tag name (`/` forbidden).
    Tag,
    /// A project (package) name.
    Project,
}

impl NameKind {
    /// Human readable label used in errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Tag => "tag",
            Self::Project => "project",
        }
    }
}

/// Validate a change name.
pub fn validate_change_name(name: &str) -> PlanResult<()> {
    validate(name, NameKind::Change)
}

/// Validate a tag name (without the leading `@`).
pub fn validate_tag_name(name: &str) -> PlanResult<()> {
    validate(name, NameKind::Tag)
}

/// Validate a project name.
pub fn validate_project_name(name: &str) -> PlanResult<()> {
    validate(name, NameKind::Project)
}

/// Check whether `name` is a valid change name.
pub fn is_valid_change_name(name: &str) -> bool {
    name_violation(name, NameKind::Change).is_none()
}

/// Check whether `name` is a valid tag name.
pub fn is_valid_tag_name(name: &str) -> bool {
    name_violation(name, NameKind::Tag).is_none()
}

/// Validate a name of the given kind.
pub fn validate(name: &str, kind: NameKind) -> PlanResult<()> {
    match name_violation(name, kind) {
        Some(reason) => Err(PlanError::invalid_name(kind.as_str(), name, reason)),
        None => Ok(()),
    }
}

/// Return the first rule `name` breaks, if any.
pub(crate) fn name_violation(name: &str, kind: NameKind) -> Option<String> {
    if name.is_empty() {
        return Some("name is empty".to_string());
    }

    if name.chars().any(char::is_whitespace) {
        return Some("contains whitespace".to_string());
    }

    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Some(format!("contains `{}`", c));
    }

    if kind == NameKind::Tag && name.contains('/') {
        return Some("tag names cannot contain `/`".to_string());
    }

    // Both ends are checked on chars; names are not restricted to ASCII.
    let first = name.chars().next()?;
    let last = name.chars().next_back()?;
    if is_edge_punctuation(first) {
        return Some(format!("cannot start with `{}`", first));
    }
    if is_edge_punctuation(last) {
        return Some(format!("cannot end with `{}`", last));
    }

    if let Some(symbol) = digit_suffix_symbol(name) {
        return Some(format!("cannot end in `{}` followed by digits", symbol));
    }

    None
}

fn is_edge_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() && c != '_'
}

/// If `name` ends with one of `~ ^ / = %` followed only by digits, return the symbol.
fn digit_suffix_symbol(name: &str) -> Option<char> {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.len() == name.len() {
        return None;
    }
    trimmed
        .chars()
        .next_back()
        .filter(|c| SUFFIX_SYMBOLS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_change_names() {
        for name in [
            "users",
            "schemas/app/tables/users",
            "add_user_table",
            "_private",
            "v2_users",
            "users2",
            "2users",
            "tables/user-accounts",
        ] {
            assert!(is_valid_change_name(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_change_names() {
        for name in [
            "",
            "has space",
            "a:b",
            "a@b",
            "a#b",
            "a\\b",
            "-leading",
            "trailing.",
            "/rooted",
            "users^2",
            "users~1",
            "users/3",
            "users=4",
            "users%5",
        ] {
            assert!(!is_valid_change_name(name), "{name} should be invalid");
        }
    }

    #[test]
    fn test_tag_names_forbid_slash() {
        assert!(is_valid_tag_name("v1.0.0"));
        assert!(is_valid_tag_name("release_1"));
        assert!(!is_valid_tag_name("v1/beta"));
        assert!(is_valid_change_name("v1/beta"));
    }

    #[test]
    fn test_digit_suffix_needs_symbol() {
        // Digits after a letter are fine, only symbol+digits is reserved.
        assert!(is_valid_change_name("migration10"));
        assert!(is_valid_tag_name("v1.0.10"));
        assert_eq!(digit_suffix_symbol("head^12"), Some('^'));
        assert_eq!(digit_suffix_symbol("head12"), None);
    }

    #[test]
    fn test_validate_error_mentions_reason() {
        let err = validate_change_name("a:b").unwrap_err();
        let display = err.to_string();
        assert!(display.contains("change"));
        assert!(display.contains("`:`"));

        let err = validate_tag_name("v1/x").unwrap_err();
        assert!(err.to_string().contains("tag"));
    }
}
