//! Integration tests running the engine over a workspace on disk.
//!
//! Packages live in a temporary directory and are read through
//! `FsScriptSource`; the ledger is in memory.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use strata::migrate::{IntegrityIssue, ScriptKind, render_header};
use strata::prelude::*;
use tempfile::TempDir;

type Engine = MigrationEngine<MemoryLedger, FsScriptSource>;

fn write_package(root: &Path, name: &str, requires: &[&str], plan: &str, changes: &[&str]) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();

    let requires = requires
        .iter()
        .map(|r| format!("\"{}\"", r))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(
        dir.join("strata.package.toml"),
        format!("name = \"{}\"\nrequires = [{}]\n", name, requires),
    )
    .unwrap();
    fs::write(dir.join("strata.plan"), plan).unwrap();

    for change in changes {
        for kind in [ScriptKind::Deploy, ScriptKind::Revert, ScriptKind::Verify] {
            let path = dir.join(kind.dir()).join(format!("{}.sql", change));
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let body = format!(
                "{}SELECT '{} {}';\n",
                render_header(kind, name, change, &[]),
                kind,
                change
            );
            fs::write(path, body).unwrap();
        }
    }
}

fn setup() -> (TempDir, Engine) {
    let temp = TempDir::new().unwrap();
    write_package(
        temp.path(),
        "auth",
        &[],
        "%project=auth\nschema\nusers [schema]\n@v1.0\n",
        &["schema", "users"],
    );
    write_package(
        temp.path(),
        "app",
        &["auth", "pgcrypto"],
        "%project=app\nschema\ntables/posts [schema auth:@v1.0]\n",
        &["schema", "tables/posts"],
    );

    let workspace = Workspace::discover(temp.path()).unwrap();
    let engine = MigrationEngine::new(
        MigrationConfig::new(),
        workspace,
        FsScriptSource::new(),
        MemoryLedger::new(),
    );
    (temp, engine)
}

fn deployed(engine: &Engine) -> Vec<String> {
    engine
        .ledger()
        .records()
        .iter()
        .map(|r| r.qualified_name())
        .collect()
}

#[test]
fn test_discover_packages() {
    let (_temp, engine) = setup();
    let names: Vec<_> = engine.workspace().packages().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["app", "auth"]);

    let order = engine.resolve_packages("app").unwrap();
    assert_eq!(order.packages, ["auth", "app"]);
    assert_eq!(order.natives, ["pgcrypto"]);
}

#[test]
fn test_resolve_from_plan_and_scripts() {
    let (_temp, engine) = setup();

    let from_plan = engine
        .resolve_dependencies(
            "app",
            ResolveOptions::new().tag_resolution(TagResolution::Resolve),
        )
        .unwrap();
    assert_eq!(from_plan.resolved, ["schema", "tables/posts"]);
    assert_eq!(from_plan.external, ["auth:users"]);

    let from_scripts = engine
        .resolve_dependencies("app", ResolveOptions::new().source(GraphSource::Scripts))
        .unwrap();
    assert_eq!(from_scripts.resolved, ["schema", "tables/posts"]);
}

#[tokio::test]
async fn test_deploy_verify_revert() {
    let (_temp, engine) = setup();
    engine.initialize().await.unwrap();

    let report = engine.deploy("app", &ExecutionOptions::new()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(
        deployed(&engine),
        ["auth:schema", "auth:users", "app:schema", "app:tables/posts"]
    );
    assert_eq!(
        engine.ledger().executed()[0],
        "CREATE EXTENSION IF NOT EXISTS \"pgcrypto\" CASCADE;"
    );

    let verify = engine.verify("app", &ExecutionOptions::new()).await.unwrap();
    assert!(verify.is_success(), "{:?}", verify.failed);
    assert_eq!(verify.verified.len(), 4);

    let report = engine.revert("app", &ExecutionOptions::new()).await.unwrap();
    assert!(report.is_success());
    assert!(deployed(&engine).is_empty());
}

#[tokio::test]
async fn test_edited_script_fails_verify() {
    let (temp, engine) = setup();
    engine.initialize().await.unwrap();
    engine.deploy("app", &ExecutionOptions::new()).await.unwrap();

    fs::write(
        temp.path().join("app/deploy/schema.sql"),
        "CREATE SCHEMA app_v2;\n",
    )
    .unwrap();

    let verify = engine.verify("app", &ExecutionOptions::new()).await.unwrap();
    assert!(!verify.is_success());
    assert_eq!(verify.failed.len(), 1);
    assert_eq!(verify.failed[0].change, "schema");
    assert!(matches!(
        verify.failed[0].issue,
        IntegrityIssue::HashMismatch { .. }
    ));
}

#[tokio::test]
async fn test_plan_edit_then_deploy() {
    let (temp, engine) = setup();
    engine.initialize().await.unwrap();
    engine.deploy("app", &ExecutionOptions::new()).await.unwrap();

    let plan_path = temp.path().join("app/strata.plan");
    let mut plan = parse_plan_file(&plan_path).unwrap();
    plan.add_change(Change::new("tables/comments").requires("tables/posts"))
        .unwrap();
    write_package(
        temp.path(),
        "app",
        &["auth", "pgcrypto"],
        &write_plan(&plan),
        &["tables/comments"],
    );
    engine.clear_cache();

    let report = engine.deploy("app", &ExecutionOptions::new()).await.unwrap();
    assert_eq!(report.changes, ["tables/comments"]);
    assert_eq!(report.skipped.len(), 4);
}
