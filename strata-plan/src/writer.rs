//! Serialize a [`Plan`] back to plan text.
//!
//! Output re-parses to an equal plan: pragmas first (`syntax-version`,
//! `project`, `uri`, then the rest), a blank line, then each change followed by
//! the tags that point at it. Tags are always written with their change.

use std::fmt;

use chrono::SecondsFormat;

use crate::model::{Change, PROJECT_PRAGMA, Plan, SYNTAX_VERSION_PRAGMA, Signature, Tag, URI_PRAGMA};

/// Render a plan to text.
pub fn write_plan(plan: &Plan) -> String {
    plan.to_string()
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(version) = self.pragmas.get(SYNTAX_VERSION_PRAGMA) {
            writeln!(f, "%{}={}", SYNTAX_VERSION_PRAGMA, version)?;
        }
        writeln!(f, "%{}={}", PROJECT_PRAGMA, self.package)?;
        if let Some(uri) = &self.uri {
            writeln!(f, "%{}={}", URI_PRAGMA, uri)?;
        }
        for (key, value) in &self.pragmas {
            if key != SYNTAX_VERSION_PRAGMA {
                writeln!(f, "%{}={}", key, value)?;
            }
        }

        if !self.is_empty() {
            writeln!(f)?;
        }

        for change in self.changes() {
            writeln!(f, "{}", ChangeLine(change))?;
            for tag in self.tags_for(&change.name) {
                writeln!(f, "{}", TagLine(tag))?;
            }
        }

        Ok(())
    }
}

struct ChangeLine<'a>(&'a Change);

impl fmt::Display for ChangeLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let change = self.0;
        f.write_str(&change.name)?;
        if !change.dependencies.is_empty() {
            write!(f, " [{}]", change.dependencies.join(" "))?;
        }
        write_signature(f, &change.signature)
    }
}

struct TagLine<'a>(&'a Tag);

impl fmt::Display for TagLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.0;
        write!(f, "@{} {}", tag.name, tag.change)?;
        write_signature(f, &tag.signature)
    }
}

/// Trailing fields are only valid after a timestamp, so without one nothing is written.
fn write_signature(f: &mut fmt::Formatter<'_>, signature: &Signature) -> fmt::Result {
    let Some(timestamp) = signature.timestamp else {
        return Ok(());
    };

    write!(f, " {}", timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))?;
    if let Some(author) = signature.author.as_deref().filter(|a| !a.is_empty()) {
        write!(f, " {}", author)?;
    }
    if let Some(email) = signature.email.as_deref().filter(|e| !e.is_empty()) {
        write!(f, " <{}>", email)?;
    }
    if let Some(comment) = signature.comment.as_deref().filter(|c| !c.is_empty()) {
        write!(f, " # {}", comment)?;
    }
    Ok(())
}
