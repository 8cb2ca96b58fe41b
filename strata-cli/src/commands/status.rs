//! `strata status` - show deployed changes per project.

use crate::cli::StatusArgs;
use crate::commands::context::Context;
use crate::error::CliResult;
use crate::output;

/// Run `strata status`
pub async fn run(ctx: &Context, args: StatusArgs) -> CliResult<()> {
    output::header("Status");

    let db = ctx.connect().await?;
    output::kv("Database", &db.display_url());
    output::kv("Ledger", db.engine.ledger().schema());
    output::newline();

    let projects = db.engine.status(args.project.as_deref()).await?;
    if projects.is_empty() {
        output::info("Nothing deployed");
        return Ok(());
    }

    for project in &projects {
        output::section(&project.project);
        output::kv("Deployed", &project.deployed_count.to_string());
        if let Some(change) = &project.last_change {
            output::kv("Last change", change);
        }
        if let Some(at) = project.last_deployed_at {
            output::kv("Last deployed", &at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }
        output::newline();
    }

    Ok(())
}
