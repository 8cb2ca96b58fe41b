//! `strata add` and `strata tag` - edit a package plan.

use std::fs;
use std::path::Path;

use strata_migrate::file::script_path;
use strata_migrate::{PackageInfo, ScriptKind, render_header};
use strata_plan::{Change, Plan, Signature, Tag, parse_plan_file, resolve_token, write_plan};
use tracing::{debug, info};

use crate::cli::{AddArgs, TagArgs};
use crate::commands::context::Context;
use crate::error::{CliError, CliResult};
use crate::output;

/// Environment variable naming the planner.
pub const USER_NAME_ENV: &str = "STRATA_USER_NAME";
/// Environment variable holding the planner's email.
pub const USER_EMAIL_ENV: &str = "STRATA_USER_EMAIL";

/// Run `strata add`
pub fn run_add(ctx: &Context, args: AddArgs) -> CliResult<()> {
    let package = ctx.workspace.package(&ctx.package(args.package.as_deref())?)?.clone();
    let mut plan = load_or_create(&package)?;

    let mut change = Change::new(args.name.as_str()).with_signature(signature(args.note));
    for dependency in &args.requires {
        change = change.requires(dependency.as_str());
    }
    plan.add_change(change)?;
    save(&package, &plan)?;

    output::success(&format!("Added {} to {}", args.name, package.name));

    for kind in [ScriptKind::Deploy, ScriptKind::Revert, ScriptKind::Verify] {
        let path = script_path(&package.root, kind, &args.name);
        if path.exists() {
            output::warn(&format!("{} already exists, leaving it alone", path.display()));
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, render_header(kind, &package.name, &args.name, &args.requires))?;
        debug!(path = %path.display(), "Created script");
        output::list_item(&relative(&path, &package.root));
    }

    Ok(())
}

/// Run `strata tag`
pub fn run_tag(ctx: &Context, args: TagArgs) -> CliResult<()> {
    let package = ctx.workspace.package(&ctx.package(args.package.as_deref())?)?.clone();
    let mut plan = parse_plan_file(package.plan_path())?;

    let change = match &args.change {
        Some(token) => resolve_token(token, &plan, Some(&package.name))?
            .change
            .ok_or_else(|| CliError::command(format!("`{}` does not name a change", token)))?,
        None => plan
            .head()
            .map(|c| c.name.clone())
            .ok_or_else(|| CliError::command("plan has no changes to tag"))?,
    };

    let name = args.name.strip_prefix('@').unwrap_or(&args.name);
    plan.add_tag(Tag::new(name, change.as_str()).with_signature(signature(args.note)))?;
    save(&package, &plan)?;

    output::success(&format!("Tagged {} as @{}", change, name));
    Ok(())
}

fn load_or_create(package: &PackageInfo) -> CliResult<Plan> {
    let path = package.plan_path();
    if path.is_file() {
        Ok(parse_plan_file(&path)?)
    } else {
        info!(package = %package.name, "Starting a new plan");
        Ok(Plan::new(package.name.as_str()))
    }
}

fn save(package: &PackageInfo, plan: &Plan) -> CliResult<()> {
    let path = package.plan_path();
    fs::write(&path, write_plan(plan))?;
    debug!(path = %path.display(), "Wrote plan");
    Ok(())
}

fn signature(note: Option<String>) -> Signature {
    let (name, email) = planner(|key| std::env::var(key).ok());
    let signature = Signature::now(name, email);
    match note {
        Some(note) => signature.with_comment(note),
        None => signature,
    }
}

fn planner(env: impl Fn(&str) -> Option<String>) -> (String, String) {
    let name = env(USER_NAME_ENV)
        .or_else(|| env("USER"))
        .unwrap_or_else(|| "strata".to_string());
    let email = env(USER_EMAIL_ENV).unwrap_or_else(|| format!("{}@localhost", name));
    (name, email)
}

fn relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}
