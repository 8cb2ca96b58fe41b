//! Change references and their resolution against a plan.
//!
//! A reference token is parsed once into a [`Reference`] and then resolved
//! without re-inspecting the string:
//!
//! | token              | variant                                   |
//! |--------------------|-------------------------------------------|
//! | `users`            | `Change("users")`                         |
//! | `@v1`              | `Tag { change: None, tag: "v1" }`         |
//! | `users@v1`         | `Tag { change: Some("users"), tag: "v1" }`|
//! | `auth:users`       | `Qualified { package: "auth", .. }`       |
//! | `HEAD`, `@ROOT`    | `Symbolic(..)`                            |
//! | `HEAD^2`, `@v1~`   | `Relative { offset: -2 / +1, .. }`        |
//! | 40 hex chars       | `ContentHash(..)`                         |

use std::fmt;

use crate::error::{ReferenceError, ReferenceResult};
use crate::model::Plan;
use crate::names::{NameKind, name_violation};

/// Length of a content-hash reference.
pub const CONTENT_HASH_LEN: usize = 40;

/// `HEAD` or `ROOT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbolic {
    /// The last change of the plan.
    Head,
    /// The first change of the plan.
    Root,
}

impl Symbolic {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "HEAD",
            Self::Root => "ROOT",
        }
    }
}

/// A parsed change reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A bare change name.
    Change(String),
    /// `@tag` or `change@tag`.
    Tag {
        /// Change component of `change@tag`.
        change: Option<String>,
        /// Tag name without `@`.
        tag: String,
    },
    /// `package:target`.
    Qualified {
        /// Package qualifier.
        package: String,
        /// The reference inside that package.
        target: Box<Reference>,
    },
    /// `base^N` (negative offset) or `base~N` (positive offset).
    Relative {
        /// The reference to walk from.
        base: Box<Reference>,
        /// Signed number of positions to walk.
        offset: i64,
    },
    /// `HEAD` or `ROOT`.
    Symbolic(Symbolic),
    /// A 40-character hex content hash.
    ContentHash(String),
}

impl Reference {
    /// Tokenize a reference.
    pub fn parse(token: &str) -> ReferenceResult<Self> {
        if token.is_empty() {
            return Err(ReferenceError::invalid(token, "reference is empty"));
        }

        if let Some((package, rest)) = token.split_once(':') {
            if let Some(reason) = name_violation(package, NameKind::Project) {
                return Err(ReferenceError::invalid(
                    token,
                    format!("invalid package `{}`: {}", package, reason),
                ));
            }
            if rest.contains(':') {
                return Err(ReferenceError::invalid(token, "more than one `:`"));
            }
            let target = parse_local(token, rest)?;
            return Ok(Self::Qualified {
                package: package.to_string(),
                target: Box::new(target),
            });
        }

        parse_local(token, token)
    }

    /// Shorthand for a `package:change` reference.
    pub fn qualified(package: impl Into<String>, change: impl Into<String>) -> Self {
        Self::Qualified {
            package: package.into(),
            target: Box::new(Self::Change(change.into())),
        }
    }

    /// Package qualifier, if any.
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Qualified { package, .. } => Some(package),
            _ => None,
        }
    }

    /// The reference with any package qualifier stripped.
    pub fn local(&self) -> &Reference {
        match self {
            Self::Qualified { target, .. } => target,
            other => other,
        }
    }

    /// Whether this is `@tag` (optionally qualified), as opposed to `change@tag`.
    pub fn is_tag(&self) -> bool {
        matches!(self.local(), Self::Tag { change: None, .. })
    }

    /// Tag name of `@tag` / `package:@tag`.
    pub fn tag_name(&self) -> Option<&str> {
        match self.local() {
            Self::Tag { change: None, tag } => Some(tag),
            _ => None,
        }
    }

    /// Whether the qualifier names a package other than `current`.
    pub fn is_foreign(&self, current: &str) -> bool {
        self.package().is_some_and(|p| p != current)
    }

    /// The bare change name this reference denotes inside `package`, if it is a
    /// plain (optionally self-qualified) change name.
    pub fn local_change_name(&self, package: &str) -> Option<&str> {
        match self {
            Self::Change(name) => Some(name),
            Self::Qualified { package: p, target } if p == package => match target.as_ref() {
                Self::Change(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Rewrite change `from` to `to` inside `package`; `None` if nothing changed.
    pub fn rename_change(&self, package: &str, from: &str, to: &str) -> Option<Reference> {
        match self {
            Self::Change(name) if name == from => Some(Self::Change(to.to_string())),
            Self::Tag {
                change: Some(name),
                tag,
            } if name == from => Some(Self::Tag {
                change: Some(to.to_string()),
                tag: tag.clone(),
            }),
            Self::Qualified { package: p, target } if p == package => {
                target
                    .rename_change(package, from, to)
                    .map(|target| Self::Qualified {
                        package: p.clone(),
                        target: Box::new(target),
                    })
            }
            Self::Relative { base, offset } => {
                base.rename_change(package, from, to)
                    .map(|base| Self::Relative {
                        base: Box::new(base),
                        offset: *offset,
                    })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Change(name) => write!(f, "{}", name),
            Self::Tag { change: None, tag } => write!(f, "@{}", tag),
            Self::Tag {
                change: Some(change),
                tag,
            } => write!(f, "{}@{}", change, tag),
            Self::Qualified { package, target } => write!(f, "{}:{}", package, target),
            Self::Relative { base, offset } => {
                if *offset < 0 {
                    write!(f, "{}^{}", base, offset.unsigned_abs())
                } else {
                    write!(f, "{}~{}", base, offset)
                }
            }
            Self::Symbolic(s) => write!(f, "{}", s.as_str()),
            Self::ContentHash(hash) => write!(f, "{}", hash),
        }
    }
}

impl std::str::FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse everything after an optional `package:` qualifier.
fn parse_local(token: &str, s: &str) -> ReferenceResult<Reference> {
    if s.is_empty() {
        return Err(ReferenceError::invalid(token, "missing change or tag"));
    }

    if let Some((base, offset)) = split_relative(s) {
        if base.is_empty() {
            return Err(ReferenceError::invalid(token, "relative reference has no base"));
        }
        let base = parse_local(token, base)?;
        return Ok(Reference::Relative {
            base: Box::new(base),
            offset,
        });
    }

    match s {
        "HEAD" | "@HEAD" => return Ok(Reference::Symbolic(Symbolic::Head)),
        "ROOT" | "@ROOT" => return Ok(Reference::Symbolic(Symbolic::Root)),
        _ => {}
    }

    if is_content_hash(s) {
        return Ok(Reference::ContentHash(s.to_string()));
    }

    if let Some(tag) = s.strip_prefix('@') {
        check(token, tag, NameKind::Tag)?;
        return Ok(Reference::Tag {
            change: None,
            tag: tag.to_string(),
        });
    }

    if let Some((change, tag)) = s.split_once('@') {
        check(token, change, NameKind::Change)?;
        check(token, tag, NameKind::Tag)?;
        return Ok(Reference::Tag {
            change: Some(change.to_string()),
            tag: tag.to_string(),
        });
    }

    check(token, s, NameKind::Change)?;
    Ok(Reference::Change(s.to_string()))
}

fn check(token: &str, name: &str, kind: NameKind) -> ReferenceResult<()> {
    match name_violation(name, kind) {
        Some(reason) => Err(ReferenceError::invalid(
            token,
            format!("invalid {} `{}`: {}", kind.as_str(), name, reason),
        )),
        None => Ok(()),
    }
}

/// Split a trailing `^`, `^^…`, `^N`, `~`, `~~…` or `~N` off `s`.
fn split_relative(s: &str) -> Option<(&str, i64)> {
    let without_digits = s.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() < s.len() {
        let digits = &s[without_digits.len()..];
        let sign = match without_digits.chars().next_back()? {
            '^' => -1,
            '~' => 1,
            _ => return None,
        };
        let count: i64 = digits.parse().ok()?;
        return Some((&without_digits[..without_digits.len() - 1], sign * count));
    }

    let symbol = s.chars().next_back()?;
    let sign = match symbol {
        '^' => -1,
        '~' => 1,
        _ => return None,
    };
    let base = s.trim_end_matches(symbol);
    let count = (s.len() - base.len()) as i64;
    Some((base, sign * count))
}

/// Whether `s` looks like a content hash.
pub fn is_content_hash(s: &str) -> bool {
    s.len() == CONTENT_HASH_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Outcome of resolving a reference.
///
/// For a foreign reference `package` is set and `change` carries the
/// untouched `package:target` token; resolving it is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Resolved change name (or the raw token for foreign/hash references).
    pub change: Option<String>,
    /// Tag component, when the reference named one.
    pub tag: Option<String>,
    /// Foreign package qualifier.
    pub package: Option<String>,
}

impl ResolvedRef {
    fn change(name: impl Into<String>) -> Self {
        Self {
            change: Some(name.into()),
            ..Default::default()
        }
    }

    /// Whether the reference points into another package.
    pub fn is_foreign(&self) -> bool {
        self.package.is_some()
    }

    /// Whether nothing was matched (e.g. `HEAD` on an empty plan).
    pub fn is_empty(&self) -> bool {
        self.change.is_none() && self.tag.is_none() && self.package.is_none()
    }
}

/// Resolve `reference` against `plan`.
///
/// `current_package` defaults to the plan's own package.
pub fn resolve(
    reference: &Reference,
    plan: &Plan,
    current_package: Option<&str>,
) -> ReferenceResult<ResolvedRef> {
    let current = current_package.unwrap_or(&plan.package);

    match reference {
        Reference::Qualified { package, target } => {
            if package != current {
                return Ok(ResolvedRef {
                    change: Some(reference.to_string()),
                    tag: None,
                    package: Some(package.clone()),
                });
            }
            resolve(target, plan, Some(current))
        }
        Reference::ContentHash(hash) => Ok(ResolvedRef::change(hash.clone())),
        Reference::Symbolic(Symbolic::Head) => Ok(plan
            .head()
            .map(|c| ResolvedRef::change(c.name.clone()))
            .unwrap_or_default()),
        Reference::Symbolic(Symbolic::Root) => Ok(plan
            .root()
            .map(|c| ResolvedRef::change(c.name.clone()))
            .unwrap_or_default()),
        Reference::Relative { base, offset } => {
            let resolved = resolve(base, plan, Some(current))?;
            if resolved.is_foreign() {
                return Err(ReferenceError::NotWalkable {
                    reference: reference.to_string(),
                });
            }
            let Some(name) = resolved.change else {
                return Ok(ResolvedRef::default());
            };
            let position = plan
                .position(&name)
                .ok_or_else(|| ReferenceError::NotWalkable {
                    reference: reference.to_string(),
                })?;
            let target = (position as i64)
                .checked_add(*offset)
                .and_then(|t| usize::try_from(t).ok())
                .filter(|t| *t < plan.len())
                .ok_or_else(|| ReferenceError::OutOfRange {
                    reference: reference.to_string(),
                    offset: *offset,
                    position,
                    len: plan.len(),
                })?;
            Ok(ResolvedRef::change(plan.changes()[target].name.clone()))
        }
        Reference::Tag { change: None, tag } => {
            let found = plan.tag(tag).ok_or_else(|| ReferenceError::TagNotFound {
                name: tag.clone(),
            })?;
            Ok(ResolvedRef {
                change: Some(found.change.clone()),
                tag: Some(tag.clone()),
                package: None,
            })
        }
        Reference::Tag {
            change: Some(change),
            tag,
        } => Ok(ResolvedRef {
            change: Some(change.clone()),
            tag: Some(tag.clone()),
            package: None,
        }),
        Reference::Change(name) => {
            if plan.contains(name) {
                Ok(ResolvedRef::change(name.clone()))
            } else {
                Err(ReferenceError::ChangeNotFound { name: name.clone() })
            }
        }
    }
}

/// Parse and resolve a reference token in one step.
pub fn resolve_token(
    token: &str,
    plan: &Plan,
    current_package: Option<&str>,
) -> ReferenceResult<ResolvedRef> {
    let reference = Reference::parse(token)?;
    resolve(&reference, plan, current_package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Change, Tag};
    use pretty_assertions::assert_eq;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn plan() -> Plan {
        let mut plan = Plan::new("app");
        plan.add_change(Change::new("schema")).unwrap();
        plan.add_change(Change::new("table").requires("schema")).unwrap();
        plan.add_change(Change::new("index").requires("table")).unwrap();
        plan.add_tag(Tag::new("v1", "table")).unwrap();
        plan
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(Reference::parse("users").unwrap(), Reference::Change("users".into()));
        assert_eq!(Reference::parse("@v1").unwrap(), Reference::Tag {
            change: None,
            tag: "v1".into()
        });
        assert_eq!(Reference::parse("users@v1").unwrap(), Reference::Tag {
            change: Some("users".into()),
            tag: "v1".into()
        });
        assert_eq!(
            Reference::parse("auth:users").unwrap(),
            Reference::qualified("auth", "users")
        );
        assert!(Reference::parse("auth:@v2").unwrap().is_tag());
        assert_eq!(
            Reference::parse("@HEAD").unwrap(),
            Reference::Symbolic(Symbolic::Head)
        );
        assert_eq!(
            Reference::parse("ROOT").unwrap(),
            Reference::Symbolic(Symbolic::Root)
        );
        assert_eq!(
            Reference::parse(HASH).unwrap(),
            Reference::ContentHash(HASH.into())
        );
    }

    #[test]
    fn test_parse_relative() {
        let cases = [
            ("HEAD^", -1),
            ("HEAD^^", -2),
            ("HEAD^3", -3),
            ("ROOT~", 1),
            ("ROOT~~~", 3),
            ("table~2", 2),
            ("@v1^", -1),
        ];
        for (token, expected) in cases {
            match Reference::parse(token).unwrap() {
                Reference::Relative { offset, .. } => assert_eq!(offset, expected, "{token}"),
                other => panic!("{token} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_invalid() {
        for token in ["", "a b", "a:b:c", ":users", "pkg:", "^", "users@", "@", "-x", "v1/@x"] {
            assert!(Reference::parse(token).is_err(), "{token:?} should fail");
        }
    }

    #[test]
    fn test_display_round_trip() {
        for token in ["users", "@v1", "users@v1", "auth:users", "auth:@v1", "HEAD^2", "ROOT~1", HASH] {
            let reference = Reference::parse(token).unwrap();
            assert_eq!(reference.to_string(), token);
        }
        assert_eq!(Reference::parse("HEAD^").unwrap().to_string(), "HEAD^1");
    }

    #[test]
    fn test_resolve_symbolic() {
        let plan = plan();
        assert_eq!(resolve_token("HEAD", &plan, None).unwrap().change.unwrap(), "index");
        assert_eq!(resolve_token("@ROOT", &plan, None).unwrap().change.unwrap(), "schema");

        let empty = Plan::new("app");
        assert!(resolve_token("HEAD", &empty, None).unwrap().is_empty());
        assert!(resolve_token("ROOT~1", &empty, None).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_relative() {
        let plan = plan();
        assert_eq!(resolve_token("HEAD^", &plan, None).unwrap().change.unwrap(), "table");
        assert_eq!(resolve_token("ROOT~2", &plan, None).unwrap().change.unwrap(), "index");
        assert_eq!(resolve_token("@v1~", &plan, None).unwrap().change.unwrap(), "index");

        let err = resolve_token("HEAD~1", &plan, None).unwrap_err();
        assert!(matches!(err, ReferenceError::OutOfRange { .. }));
        let err = resolve_token("ROOT^", &plan, None).unwrap_err();
        assert!(matches!(err, ReferenceError::OutOfRange { .. }));
    }

    #[test]
    fn test_resolve_relative_extreme_offsets() {
        let plan = plan();
        for token in ["HEAD~9223372036854775807", "ROOT^9223372036854775807"] {
            let err = resolve_token(token, &plan, None).unwrap_err();
            assert!(matches!(err, ReferenceError::OutOfRange { .. }), "{token}");
        }
    }

    #[test]
    fn test_resolve_tags() {
        let plan = plan();
        let resolved = resolve_token("@v1", &plan, None).unwrap();
        assert_eq!(resolved.change.as_deref(), Some("table"));
        assert_eq!(resolved.tag.as_deref(), Some("v1"));

        let err = resolve_token("@v9", &plan, None).unwrap_err();
        assert_eq!(err, ReferenceError::TagNotFound { name: "v9".into() });

        // No cross-validation between the two halves.
        let resolved = resolve_token("index@v9", &plan, None).unwrap();
        assert_eq!(resolved.change.as_deref(), Some("index"));
        assert_eq!(resolved.tag.as_deref(), Some("v9"));
    }

    #[test]
    fn test_resolve_packages() {
        let plan = plan();
        let resolved = resolve_token("auth:users", &plan, None).unwrap();
        assert!(resolved.is_foreign());
        assert_eq!(resolved.change.as_deref(), Some("auth:users"));
        assert_eq!(resolved.package.as_deref(), Some("auth"));

        let resolved = resolve_token("app:table", &plan, None).unwrap();
        assert!(!resolved.is_foreign());
        assert_eq!(resolved.change.as_deref(), Some("table"));

        // An explicit current package overrides the plan's own name.
        let resolved = resolve_token("app:table", &plan, Some("other")).unwrap();
        assert!(resolved.is_foreign());
    }

    #[test]
    fn test_resolve_change_and_hash() {
        let plan = plan();
        assert_eq!(resolve_token("schema", &plan, None).unwrap().change.unwrap(), "schema");
        assert_eq!(resolve_token(HASH, &plan, None).unwrap().change.unwrap(), HASH);

        let err = resolve_token("missing", &plan, None).unwrap_err();
        assert!(err.to_string().contains("change not found"));
    }

    #[test]
    fn test_rename_change() {
        let reference = Reference::parse("app:table^1").unwrap();
        let renamed = reference.rename_change("app", "table", "tbl").unwrap();
        assert_eq!(renamed.to_string(), "app:tbl^1");

        let reference = Reference::parse("HEAD^1").unwrap();
        assert!(reference.rename_change("app", "table", "tbl").is_none());

        let reference = Reference::parse("table^1").unwrap();
        let renamed = reference.rename_change("app", "table", "tbl").unwrap();
        assert_eq!(renamed.to_string(), "tbl^1");

        let reference = Reference::parse("app:table").unwrap();
        let renamed = reference.rename_change("app", "table", "tbl").unwrap();
        assert_eq!(renamed.to_string(), "app:tbl");

        let reference = Reference::parse("other:table").unwrap();
        assert!(reference.rename_change("app", "table", "tbl").is_none());
    }
}
