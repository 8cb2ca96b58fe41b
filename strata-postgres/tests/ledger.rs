//! Ledger tests against a live server.
//!
//! Set `STRATA_TEST_DATABASE_URL` to run them; they are skipped otherwise.
//! Each test works in its own schema and drops it afterwards.

use pretty_assertions::assert_eq;
use strata_migrate::{LedgerRecord, LedgerStore};
use strata_postgres::{PgLedger, PgPool, quote_ident};

async fn ledger(schema: &str) -> Option<PgLedger> {
    let url = std::env::var("STRATA_TEST_DATABASE_URL").ok()?;
    let pool = PgPool::from_url(&url).unwrap();
    let ledger = PgLedger::connect(&pool, schema).await.unwrap();
    ledger
        .execute_script(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema)))
        .await
        .unwrap();
    ledger.initialize().await.unwrap();
    Some(ledger)
}

async fn cleanup(ledger: &PgLedger) {
    ledger
        .execute_script(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(ledger.schema())
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ledger_round_trip() {
    let Some(ledger) = ledger("strata_test_round_trip").await else {
        return;
    };

    ledger
        .record_deploy(&LedgerRecord::new("app", "schema", "h1", vec![]))
        .await
        .unwrap();
    ledger
        .record_deploy(&LedgerRecord::new(
            "app",
            "table",
            "h2",
            vec!["app:schema".to_string()],
        ))
        .await
        .unwrap();

    assert!(ledger.is_deployed("app", "table").await.unwrap());
    let names: Vec<_> = ledger
        .deployed(None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.change_name)
        .collect();
    assert_eq!(names, vec!["schema", "table"]);

    let dependents = ledger.dependents_of("app", "schema").await.unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].dependencies, vec!["app:schema"]);

    let status = ledger.status(Some("app")).await.unwrap();
    assert_eq!(status[0].deployed_count, 2);

    cleanup(&ledger).await;
}

#[tokio::test]
async fn test_rollback_discards_rows_and_scripts() {
    let Some(ledger) = ledger("strata_test_rollback").await else {
        return;
    };

    ledger.begin().await.unwrap();
    ledger
        .record_deploy(&LedgerRecord::new("app", "schema", "h1", vec![]))
        .await
        .unwrap();
    ledger
        .execute_script("CREATE TABLE strata_test_rollback.scratch (id int)")
        .await
        .unwrap();
    ledger.rollback().await.unwrap();

    assert!(ledger.deployed(None).await.unwrap().is_empty());
    assert!(
        ledger
            .execute_script("SELECT * FROM strata_test_rollback.scratch")
            .await
            .is_err()
    );

    cleanup(&ledger).await;
}

#[tokio::test]
async fn test_advisory_lock() {
    let Some(ledger) = ledger("strata_test_lock").await else {
        return;
    };

    ledger.acquire_lock().await.unwrap();
    ledger.release_lock().await.unwrap();

    cleanup(&ledger).await;
}
