//! Integration tests for the strata CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get the strata binary
#[allow(deprecated)]
fn strata_cmd() -> Command {
    let mut cmd = Command::cargo_bin("strata").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("STRATA_LOG_LEVEL")
        .env_remove("STRATA_DEBUG");
    cmd
}

fn write_package(root: &Path, name: &str, requires: &[&str], plan: &str) {
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
}

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    write_package(
        temp.path(),
        "proj",
        &[],
        "%project=proj\nchangeA\n@v1.0.0\nchangeB [changeA]\n",
    );
    write_package(
        temp.path(),
        "app",
        &["proj", "pgcrypto"],
        "%project=app\nschema\ntable [schema proj:@v1.0.0]\n@v1\nindex [table]\n",
    );
    temp
}

#[test]
fn test_help_command() {
    strata_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dependency-aware schema migrations"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("revert"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_deploy_help() {
    strata_cmd()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--to"))
        .stdout(predicate::str::contains("--no-transaction"));
}

#[test]
fn test_plan_prints_order() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["plan", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan for app"))
        .stdout(predicate::str::contains("proj"))
        .stdout(predicate::str::contains("pgcrypto"))
        .stdout(predicate::str::contains("index"))
        .stdout(predicate::str::contains("proj:changeA"));
}

#[test]
fn test_plan_internal_tags() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["plan", "app", "--tags", "internal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tags"))
        .stdout(predicate::str::contains("proj:@v1.0.0"));
}

#[test]
fn test_plan_defaults_to_current_package() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path().join("proj"))
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan for proj"));
}

#[test]
fn test_plan_needs_package_name_at_root() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("several packages"));
}

#[test]
fn test_plan_unknown_package() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["plan", "billing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("billing"));
}

#[test]
fn test_plan_reports_broken_plan() {
    let temp = workspace();
    fs::write(
        temp.path().join("proj").join("strata.plan"),
        "%project=proj\nchangeA\nchangeA\n",
    )
    .unwrap();

    strata_cmd()
        .current_dir(temp.path())
        .args(["plan", "proj"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_add_change() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .env("STRATA_USER_NAME", "Ada")
        .env("STRATA_USER_EMAIL", "ada@example.com")
        .args([
            "add",
            "tables/users",
            "-p",
            "app",
            "-r",
            "schema",
            "-n",
            "Users table",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added tables/users to app"));

    let app = temp.path().join("app");
    let plan = fs::read_to_string(app.join("strata.plan")).unwrap();
    assert!(plan.contains("tables/users [schema]"));
    assert!(plan.contains("Ada <ada@example.com>"));
    assert!(plan.contains("# Users table"));

    let deploy = fs::read_to_string(app.join("deploy/tables/users.sql")).unwrap();
    assert!(deploy.starts_with("-- Deploy app:tables/users"));
    assert!(deploy.contains("-- requires: schema"));
    assert!(app.join("revert/tables/users.sql").is_file());
    assert!(app.join("verify/tables/users.sql").is_file());
}

#[test]
fn test_add_keeps_existing_scripts() {
    let temp = workspace();
    let script = temp.path().join("app/deploy/views.sql");
    fs::create_dir_all(script.parent().unwrap()).unwrap();
    fs::write(&script, "CREATE VIEW v AS SELECT 1;\n").unwrap();

    strata_cmd()
        .current_dir(temp.path().join("app"))
        .args(["add", "views"])
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&script).unwrap(),
        "CREATE VIEW v AS SELECT 1;\n"
    );
}

#[test]
fn test_add_rejects_unknown_dependency() {
    let temp = workspace();
    let plan_path = temp.path().join("app/strata.plan");
    let before = fs::read_to_string(&plan_path).unwrap();

    strata_cmd()
        .current_dir(temp.path())
        .args(["add", "tables/users", "-p", "app", "-r", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));

    assert_eq!(fs::read_to_string(&plan_path).unwrap(), before);
    assert!(!temp.path().join("app/deploy/tables/users.sql").exists());
}

#[test]
fn test_add_starts_new_plan() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("strata.package.toml"), "name = \"solo\"\n").unwrap();

    strata_cmd()
        .current_dir(temp.path())
        .args(["add", "init"])
        .assert()
        .success();

    let plan = fs::read_to_string(temp.path().join("strata.plan")).unwrap();
    assert!(plan.contains("%project=solo"));
    assert!(plan.contains("\ninit "));
}

#[test]
fn test_tag_head() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["tag", "@v2", "-p", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged index as @v2"));

    let plan = fs::read_to_string(temp.path().join("app/strata.plan")).unwrap();
    assert!(plan.contains("@v2 "));
}

#[test]
fn test_tag_named_change() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["tag", "v0", "-p", "app", "-c", "schema"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged schema as @v0"));

    let plan = fs::read_to_string(temp.path().join("app/strata.plan")).unwrap();
    let schema = plan.find("\nschema").unwrap();
    let tag = plan.find("@v0").unwrap();
    let table = plan.find("\ntable").unwrap();
    assert!(schema < tag && tag < table);
}

#[test]
fn test_tag_duplicate_fails() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["tag", "v1", "-p", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate tag"));
}

#[test]
fn test_deploy_without_database_url() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["deploy", "app"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no database URL"));
}

#[test]
fn test_config_workspace_root() {
    let temp = TempDir::new().unwrap();
    write_package(&temp.path().join("db"), "app", &[], "%project=app\nschema\n");
    fs::write(
        temp.path().join("strata.toml"),
        "[workspace]\nroot = \"db\"\n",
    )
    .unwrap();

    strata_cmd()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan for app"));

    strata_cmd()
        .args(["--config", temp.path().join("strata.toml").to_str().unwrap()])
        .args(["plan", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn test_invalid_config() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("strata.toml"), "[deploy\n").unwrap();

    strata_cmd()
        .current_dir(temp.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse TOML"));
}

#[test]
fn test_pending_plan_needs_database() {
    let temp = workspace();

    strata_cmd()
        .current_dir(temp.path())
        .args(["plan", "app", "--pending"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no database URL"));
}
