//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use strata_migrate::{GraphSource, TagResolution};

/// strata - dependency-aware schema migrations
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author = "Pegasus Heavy Industries LLC")]
#[command(version)]
#[command(about = "strata - dependency-aware schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to strata.toml (defaults to ./strata.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overriding DATABASE_URL and the config file
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy a package and everything it requires
    Deploy(ExecArgs),

    /// Revert deployed changes
    Revert(ExecArgs),

    /// Check deployed changes against their scripts
    Verify(VerifyArgs),

    /// Show what is deployed
    Status(StatusArgs),

    /// Print the resolved change order of a package
    Plan(PlanArgs),

    /// Add a change to a package plan
    Add(AddArgs),

    /// Tag a change in a package plan
    Tag(TagArgs),
}

// =============================================================================
// Deploy / Revert / Verify
// =============================================================================

/// Arguments for `deploy` and `revert`
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Package name (defaults to the package in the current directory)
    pub package: Option<String>,

    /// Stop at this change (name, @tag, HEAD^, ...)
    #[arg(long = "to")]
    pub to: Option<String>,

    /// Run each change on its own instead of in one transaction
    #[arg(long)]
    pub no_transaction: bool,
}

/// Arguments for `verify`
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Package name (defaults to the package in the current directory)
    pub package: Option<String>,

    /// Stop at this change
    #[arg(long = "to")]
    pub to: Option<String>,
}

/// Arguments for `status`
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this project
    pub project: Option<String>,
}

// =============================================================================
// Plan
// =============================================================================

/// Arguments for `plan`
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Package name (defaults to the package in the current directory)
    pub package: Option<String>,

    /// Where the graph comes from
    #[arg(long, default_value = "plan")]
    pub source: SourceArg,

    /// How tag dependencies are handled
    #[arg(long, default_value = "preserve")]
    pub tags: TagsArg,

    /// Only list changes not yet deployed (needs a database)
    #[arg(long)]
    pub pending: bool,

    /// Stop at this change (with --pending)
    #[arg(long = "to", requires = "pending")]
    pub to: Option<String>,
}

/// Graph source
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum SourceArg {
    /// The package plan
    #[default]
    Plan,
    /// `-- requires:` headers of deploy scripts
    Scripts,
}

impl From<SourceArg> for GraphSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Plan => GraphSource::Plan,
            SourceArg::Scripts => GraphSource::Scripts,
        }
    }
}

/// Tag handling mode
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum TagsArg {
    /// Keep tag edges until traversal
    #[default]
    Preserve,
    /// Rewrite tag edges to their changes
    Resolve,
    /// Keep tag edges and report what they resolve to
    Internal,
}

impl From<TagsArg> for TagResolution {
    fn from(arg: TagsArg) -> Self {
        match arg {
            TagsArg::Preserve => TagResolution::Preserve,
            TagsArg::Resolve => TagResolution::Resolve,
            TagsArg::Internal => TagResolution::Internal,
        }
    }
}

// =============================================================================
// Add / Tag
// =============================================================================

/// Arguments for `add`
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Change name, e.g. `schemas/app/tables/users`
    pub name: String,

    /// Package to add to (defaults to the package in the current directory)
    #[arg(short, long)]
    pub package: Option<String>,

    /// Dependency of the new change (repeatable)
    #[arg(short, long = "requires")]
    pub requires: Vec<String>,

    /// Note recorded in the plan
    #[arg(short, long)]
    pub note: Option<String>,
}

/// Arguments for `tag`
#[derive(Args, Debug)]
pub struct TagArgs {
    /// Tag name, with or without the leading `@`
    pub name: String,

    /// Package to tag (defaults to the package in the current directory)
    #[arg(short, long)]
    pub package: Option<String>,

    /// Change to tag (defaults to the last change)
    #[arg(short, long)]
    pub change: Option<String>,

    /// Note recorded in the plan
    #[arg(short, long)]
    pub note: Option<String>,
}
