//! `strata plan` - print the resolved order of a package.
//!
//! Without `--pending` nothing touches the database.

use strata_migrate::{ExecutionOptions, FsScriptSource, GraphBuilder, ResolveOptions};
use strata_plan::PlanCache;

use crate::cli::PlanArgs;
use crate::commands::context::Context;
use crate::error::CliResult;
use crate::output::{self, Mark};

/// Run `strata plan`
pub async fn run(ctx: &Context, args: PlanArgs) -> CliResult<()> {
    let package = ctx.package(args.package.as_deref())?;
    if args.pending {
        return run_pending(ctx, &package, args.to).await;
    }

    let source = FsScriptSource::new();
    let cache = PlanCache::new();
    let builder = GraphBuilder::new(&ctx.workspace, &source, &cache);

    let options = ResolveOptions::new()
        .source(args.source.into())
        .tag_resolution(args.tags.into());
    let order = builder.resolve_packages(&package)?;
    let resolution = builder.resolve_dependencies(&package, options)?;

    output::header(&format!("Plan for {}", package));

    output::section("Packages");
    for (i, name) in order.packages.iter().enumerate() {
        output::numbered_item(i + 1, name);
    }
    print_natives(&order.natives);

    output::newline();
    output::section("Changes");
    for (i, change) in resolution.resolved.iter().enumerate() {
        output::numbered_item(i + 1, change);
    }

    if !resolution.external.is_empty() {
        output::newline();
        output::section("External");
        for change in &resolution.external {
            output::list_item(change);
        }
    }

    if !resolution.resolved_tags.is_empty() {
        output::newline();
        output::section("Tags");
        for (tag, change) in &resolution.resolved_tags {
            output::kv(tag, change);
        }
    }

    output::newline();
    Ok(())
}

async fn run_pending(ctx: &Context, package: &str, to: Option<String>) -> CliResult<()> {
    let db = ctx.connect().await?;

    let mut options = ExecutionOptions::new();
    options.to_change = to;
    let pending = db.engine.plan_changes(package, &options).await?;

    output::header(&format!("Pending for {}", package));
    output::kv("Database", &db.display_url());
    print_natives(&pending.natives);
    output::newline();

    if pending.changes.is_empty() {
        output::info("Nothing to deploy");
        return Ok(());
    }
    for change in &pending.changes {
        output::change(Mark::Pending, change);
    }
    output::newline();
    Ok(())
}

fn print_natives(natives: &[String]) {
    if natives.is_empty() {
        return;
    }
    output::newline();
    output::section("Extensions");
    for name in natives {
        output::list_item(name);
    }
}
