//! Script header comments.
//!
//! Deploy scripts open with a self-declaration and may list their
//! dependencies:
//!
//! ```sql
//! -- Deploy app:schemas/app/tables/users to pg
//! -- requires: schemas/app
//! -- requires: auth:@v1.0
//! ```
//!
//! The trailing `to pg` is an older suffix and is ignored.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::file::ScriptKind;

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^--\s*(Deploy|Revert|Verify)\s+(\S+?)(?:\s+to\s+pg)?\s*$").unwrap()
});

static REQUIRES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--\s*requires:\s*(\S+)\s*$").unwrap());

/// Parsed header of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptHeader {
    /// Which kind of script declared itself.
    pub kind: Option<ScriptKind>,
    /// Project qualifier from the declaration line.
    pub project: Option<String>,
    /// Change path from the declaration line.
    pub change: Option<String>,
    /// `-- requires:` tokens in file order.
    pub requires: Vec<String>,
}

impl ScriptHeader {
    /// The declared target as written, `project:change` or `change`.
    pub fn declared(&self) -> Option<String> {
        let change = self.change.as_ref()?;
        Some(match &self.project {
            Some(project) => format!("{}:{}", project, change),
            None => change.clone(),
        })
    }
}

/// Parse the header comments of a script.
pub fn parse_header(script: &str) -> ScriptHeader {
    let mut header = ScriptHeader::default();

    for line in script.lines() {
        let line = line.trim();
        if !line.starts_with("--") {
            continue;
        }

        if let Some(caps) = REQUIRES.captures(line) {
            header.requires.push(caps[1].to_string());
            continue;
        }

        if header.change.is_none()
            && let Some(caps) = DECLARATION.captures(line)
        {
            header.kind = caps[1].parse().ok();
            let target = &caps[2];
            match target.split_once(':') {
                Some((project, change)) => {
                    header.project = Some(project.to_string());
                    header.change = Some(change.to_string());
                }
                None => header.change = Some(target.to_string()),
            }
        }
    }

    header
}

/// Render the header block for a new script.
pub fn render_header(kind: ScriptKind, project: &str, change: &str, requires: &[String]) -> String {
    let mut out = format!("-- {} {}:{} to pg\n", kind.title(), project, change);
    if kind == ScriptKind::Deploy {
        for dependency in requires {
            out.push_str(&format!("-- requires: {}\n", dependency));
        }
    }
    out
}
