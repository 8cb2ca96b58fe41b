//! Parser for `strata.plan` files.
//!
//! Plans are line oriented. Each line is classified by its first character and
//! then matched against the corresponding pest rule:
//!
//! ```text
//! %syntax-version=1.0.0
//! %project=app
//!
//! schema 2024-01-15T10:30:00Z Jane Doe <jane@example.com> # app schema
//! tables/users [schema] 2024-01-15T10:31:00Z Jane Doe <jane@example.com>
//! @v1.0 2024-01-15T10:32:00Z Jane Doe <jane@example.com> # first release
//! ```
//!
//! Every error is collected with its line number; a plan is only returned when
//! there are none.

mod grammar;

use std::path::Path;

use chrono::{DateTime, Utc};
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::model::{Change, PROJECT_PRAGMA, Plan, Signature, Tag, URI_PRAGMA};
use crate::names::validate_project_name;

pub use grammar::{PlanParser, Rule};

/// Parse a plan from a string.
pub fn parse_plan(input: &str) -> PlanResult<Plan> {
    let mut state = ParseState::new();

    for (index, raw) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = match line.as_bytes()[0] {
            b'%' => state.pragma(line),
            b'@' => state.tag(line),
            _ => state.change(line),
        };

        if let Err(e) = result {
            state.errors.push(e.at_line(line_no));
        }
    }

    state.finish()
}

/// Parse a plan from a file.
pub fn parse_plan_file(path: impl AsRef<Path>) -> PlanResult<Plan> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| PlanError::IoError {
        path: path.display().to_string(),
        source: e,
    })?;

    debug!(path = %path.display(), "Parsing plan file");
    parse_plan(&content)
}

struct ParseState {
    plan: Plan,
    has_project: bool,
    errors: Vec<PlanError>,
}

impl ParseState {
    fn new() -> Self {
        let mut plan = Plan::new(String::new());
        plan.pragmas.clear();
        Self {
            plan,
            has_project: false,
            errors: Vec::new(),
        }
    }

    fn finish(mut self) -> PlanResult<Plan> {
        if !self.has_project {
            self.errors.insert(0, PlanError::MissingProject.at_line(1));
        }

        if self.errors.is_empty() {
            debug!(
                package = %self.plan.package,
                changes = self.plan.len(),
                tags = self.plan.tags().len(),
                "Parsed plan"
            );
            Ok(self.plan)
        } else {
            Err(PlanError::ParseFailed {
                count: self.errors.len(),
                errors: self.errors,
            })
        }
    }

    fn pragma(&mut self, line: &str) -> PlanResult<()> {
        let pair = parse_line(Rule::pragma_line, line)?;
        let mut key = "";
        let mut value = "";
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::pragma_key => key = item.as_str(),
                Rule::pragma_value => value = item.as_str().trim(),
                _ => {}
            }
        }

        match key {
            PROJECT_PRAGMA => {
                if self.has_project {
                    return Err(PlanError::duplicate("pragma", key));
                }
                validate_project_name(value)?;
                self.plan.package = value.to_string();
                self.has_project = true;
            }
            URI_PRAGMA => {
                if self.plan.uri.is_some() {
                    return Err(PlanError::duplicate("pragma", key));
                }
                self.plan.uri = Some(value.to_string());
            }
            _ => {
                if self.plan.pragmas.contains_key(key) {
                    return Err(PlanError::duplicate("pragma", key));
                }
                self.plan.pragmas.insert(key.to_string(), value.to_string());
            }
        }

        Ok(())
    }

    fn change(&mut self, line: &str) -> PlanResult<()> {
        let pair = parse_line(Rule::change_line, line)?;
        let mut change = Change::new(String::new());

        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::name => change.name = item.as_str().to_string(),
                Rule::dependencies => {
                    change.dependencies = item
                        .into_inner()
                        .map(|d| d.as_str().to_string())
                        .collect();
                }
                Rule::trailer => change.signature = parse_trailer(item)?,
                _ => {}
            }
        }

        self.plan.add_change(change)
    }

    fn tag(&mut self, line: &str) -> PlanResult<()> {
        let pair = parse_line(Rule::tag_line, line)?;
        let mut name = String::new();
        let mut change = None;
        let mut signature = Signature::default();

        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::tag_head => {
                    if let Some(inner) = item.into_inner().next() {
                        name = inner.as_str().to_string();
                    }
                }
                Rule::tag_change => change = Some(item.as_str().to_string()),
                Rule::trailer => signature = parse_trailer(item)?,
                _ => {}
            }
        }

        let change = match change {
            Some(change) => change,
            None => match self.plan.head() {
                Some(head) => head.name.clone(),
                None => return Err(PlanError::OrphanTag { tag: name }),
            },
        };

        self.plan
            .add_tag(Tag::new(name, change).with_signature(signature))
    }
}

/// Match a single line against `rule`.
fn parse_line(rule: Rule, line: &str) -> PlanResult<Pair<'_, Rule>> {
    let mut pairs = PlanParser::parse(rule, line).map_err(|e| {
        let column = match e.line_col {
            LineColLocation::Pos((_, col)) | LineColLocation::Span((_, col), _) => col,
        };
        PlanError::Syntax {
            message: format!("column {}: {}", column, e.variant.message()),
        }
    })?;

    pairs.next().ok_or_else(|| PlanError::Syntax {
        message: "empty line".to_string(),
    })
}

fn parse_trailer(pair: Pair<'_, Rule>) -> PlanResult<Signature> {
    let mut signature = Signature::default();

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::timestamp => signature.timestamp = Some(parse_timestamp(item.as_str())?),
            Rule::author => signature.author = non_empty(item.as_str()),
            Rule::email => {
                signature.email = item.into_inner().next().and_then(|e| non_empty(e.as_str()));
            }
            Rule::note => {
                signature.comment = item.into_inner().next().and_then(|n| non_empty(n.as_str()));
            }
            _ => {}
        }
    }

    Ok(signature)
}

fn parse_timestamp(s: &str) -> PlanResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PlanError::Syntax {
            message: format!("invalid timestamp `{}`: {}", s, e),
        })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
