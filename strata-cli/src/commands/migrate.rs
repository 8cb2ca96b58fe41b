//! `strata deploy`, `strata revert`, and `strata verify`.

use strata_migrate::{ChangeReport, ExecutionOptions};

use crate::cli::{ExecArgs, VerifyArgs};
use crate::commands::context::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, Mark};

fn execution_options(to: Option<String>, no_transaction: bool) -> ExecutionOptions {
    let mut options = ExecutionOptions::new();
    options.to_change = to;
    if no_transaction {
        options = options.use_transaction(false);
    }
    options
}

/// Run `strata deploy`
pub async fn run_deploy(ctx: &Context, args: ExecArgs) -> CliResult<()> {
    output::header("Deploy");

    let package = ctx.package(args.package.as_deref())?;
    let db = ctx.connect().await?;
    output::kv("Package", &package);
    output::kv("Database", &db.display_url());
    if let Some(to) = &args.to {
        output::kv("To", to);
    }
    output::newline();

    let options = execution_options(args.to, args.no_transaction);
    db.lock().await?;
    let result = db.engine.deploy(&package, &options).await;
    db.unlock().await?;

    finish(result?, Mark::Deployed, "deployed")
}

/// Run `strata revert`
pub async fn run_revert(ctx: &Context, args: ExecArgs) -> CliResult<()> {
    output::header("Revert");

    let package = ctx.package(args.package.as_deref())?;
    let db = ctx.connect().await?;
    output::kv("Package", &package);
    output::kv("Database", &db.display_url());
    if let Some(to) = &args.to {
        output::kv("To", to);
    }
    output::newline();

    let options = execution_options(args.to, args.no_transaction);
    db.lock().await?;
    let result = db.engine.revert(&package, &options).await;
    db.unlock().await?;

    finish(result?, Mark::Reverted, "reverted")
}

fn finish(report: ChangeReport, mark: Mark, verb: &str) -> CliResult<()> {
    for change in &report.changes {
        output::change(mark, change);
    }
    if let Some(failed) = &report.failed {
        output::change(Mark::Failed, failed);
    }
    if !report.skipped.is_empty() {
        output::unchanged(report.skipped.len());
    }
    output::newline();

    let report = report.into_result()?;
    if report.changes.is_empty() {
        output::info(&format!("Nothing {}", verb));
    } else {
        output::success(&report.summary());
    }
    Ok(())
}

/// Run `strata verify`
pub async fn run_verify(ctx: &Context, args: VerifyArgs) -> CliResult<()> {
    output::header("Verify");

    let package = ctx.package(args.package.as_deref())?;
    let db = ctx.connect().await?;
    output::kv("Package", &package);
    output::kv("Database", &db.display_url());
    output::newline();

    let report = db
        .engine
        .verify(&package, &execution_options(args.to, false))
        .await?;

    for change in &report.verified {
        output::change(Mark::Verified, change);
    }
    for failure in &report.failed {
        output::change_note(Mark::Failed, &failure.change, &failure.issue.to_string());
    }
    output::newline();

    if report.is_success() {
        output::success(&report.summary());
        Ok(())
    } else {
        Err(CliError::command(format!(
            "verification failed: {}",
            report.summary()
        )))
    }
}
