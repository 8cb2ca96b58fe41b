//! strata - dependency-aware schema migrations.

use clap::Parser;
use miette::Diagnostic;

use strata_cli::cli::{Cli, Command};
use strata_cli::commands::{self, Context};
use strata_cli::config::Config;
use strata_cli::error::{CliError, CliResult};
use strata_cli::{logging, output};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        report_related(&e);
        std::process::exit(1);
    }
}

fn report_related(err: &CliError) {
    if let Some(related) = err.related() {
        for diagnostic in related {
            eprintln!("  {}", diagnostic);
        }
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let (config, base) = match &cli.config {
        Some(path) => {
            let base = path
                .parent()
                .map(|p| cwd.join(p))
                .unwrap_or_else(|| cwd.clone());
            (Config::load(path)?, base)
        }
        None => (Config::load_or_default(&cwd)?, cwd.clone()),
    };
    logging::init(&config.logging);

    let ctx = Context::new(config, &base, cli.database_url)?;

    match cli.command {
        Command::Deploy(args) => commands::migrate::run_deploy(&ctx, args).await,
        Command::Revert(args) => commands::migrate::run_revert(&ctx, args).await,
        Command::Verify(args) => commands::migrate::run_verify(&ctx, args).await,
        Command::Status(args) => commands::status::run(&ctx, args).await,
        Command::Plan(args) => commands::plan::run(&ctx, args).await,
        Command::Add(args) => commands::edit::run_add(&ctx, args),
        Command::Tag(args) => commands::edit::run_tag(&ctx, args),
    }
}
