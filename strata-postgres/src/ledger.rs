//! PostgreSQL ledger store.
//!
//! Ledger rows live in `<schema>.changes`:
//!
//! ```sql
//! CREATE TABLE strata_migrate.changes (
//!     id            BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
//!     project       TEXT NOT NULL,
//!     change_name   TEXT NOT NULL,
//!     script_hash   TEXT NOT NULL,
//!     dependencies  TEXT[] NOT NULL DEFAULT '{}',
//!     deployed_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     UNIQUE (project, change_name)
//! );
//! ```

use chrono::{DateTime, Utc};
use strata_migrate::ledger::summarize;
use strata_migrate::{LedgerRecord, LedgerStore, MigrateResult, ProjectStatus};
use tokio::sync::Mutex;
use tokio_postgres::Row;
use tracing::{debug, info};

use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};
use crate::pool::PgPool;

/// Advisory lock key held while a deploy or revert runs.
pub const LOCK_KEY: i64 = 0x5374_7261_7461;

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL creating the ledger schema and table.
pub fn create_ledger_sql(schema: &str) -> String {
    let schema = quote_ident(schema);
    format!(
        r#"CREATE SCHEMA IF NOT EXISTS {schema};
CREATE TABLE IF NOT EXISTS {schema}.changes (
    id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    project TEXT NOT NULL,
    change_name TEXT NOT NULL,
    script_hash TEXT NOT NULL,
    dependencies TEXT[] NOT NULL DEFAULT '{{}}',
    deployed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (project, change_name)
);
CREATE INDEX IF NOT EXISTS changes_dependencies_idx ON {schema}.changes USING GIN (dependencies);"#
    )
}

/// Ledger statements for one schema.
#[derive(Debug, Clone)]
struct Queries {
    is_deployed: String,
    deployed: String,
    insert: String,
    delete: String,
    dependents: String,
    by_hash: String,
}

impl Queries {
    fn new(schema: &str) -> Self {
        let table = format!("{}.changes", quote_ident(schema));
        let columns = "project, change_name, script_hash, dependencies, deployed_at";
        Self {
            is_deployed: format!(
                "SELECT 1 FROM {table} WHERE project = $1 AND change_name = $2"
            ),
            deployed: format!(
                "SELECT {columns} FROM {table} WHERE $1::text IS NULL OR project = $1 ORDER BY id"
            ),
            insert: format!("INSERT INTO {table} ({columns}) VALUES ($1, $2, $3, $4, $5)"),
            delete: format!("DELETE FROM {table} WHERE project = $1 AND change_name = $2"),
            dependents: format!(
                "SELECT {columns} FROM {table} WHERE $1 = ANY(dependencies) ORDER BY id"
            ),
            by_hash: format!(
                "SELECT {columns} FROM {table} WHERE starts_with(script_hash, $1) ORDER BY id LIMIT 1"
            ),
        }
    }
}

/// [`LedgerStore`] backed by PostgreSQL.
///
/// Holds one connection for its lifetime so a transaction opened by
/// [`begin`](LedgerStore::begin) covers every later call until it ends.
pub struct PgLedger {
    conn: Mutex<PgConnection>,
    schema: String,
    queries: Queries,
}

impl PgLedger {
    /// Take a connection from `pool` for a ledger in `schema`.
    pub async fn connect(pool: &PgPool, schema: impl Into<String>) -> PgResult<Self> {
        let conn = pool.get().await?;
        Ok(Self::with_connection(conn, schema))
    }

    /// Use an existing connection.
    pub fn with_connection(conn: PgConnection, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        Self {
            conn: Mutex::new(conn),
            queries: Queries::new(&schema),
            schema,
        }
    }

    /// Schema holding the ledger table.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Block until no other session holds the migration lock.
    pub async fn acquire_lock(&self) -> PgResult<()> {
        debug!(key = LOCK_KEY, "Acquiring advisory lock");
        self.conn
            .lock()
            .await
            .execute("SELECT pg_advisory_lock($1)", &[&LOCK_KEY])
            .await?;
        Ok(())
    }

    /// Release the migration lock.
    pub async fn release_lock(&self) -> PgResult<()> {
        debug!(key = LOCK_KEY, "Releasing advisory lock");
        self.conn
            .lock()
            .await
            .execute("SELECT pg_advisory_unlock($1)", &[&LOCK_KEY])
            .await?;
        Ok(())
    }

    async fn records(&self, sql: &str, key: Option<&str>) -> PgResult<Vec<LedgerRecord>> {
        let rows = self.conn.lock().await.query(sql, &[&key]).await?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &Row) -> PgResult<LedgerRecord> {
    let field = |e: tokio_postgres::Error| PgError::Row(e.to_string());
    Ok(LedgerRecord {
        project: row.try_get("project").map_err(field)?,
        change_name: row.try_get("change_name").map_err(field)?,
        script_hash: row.try_get("script_hash").map_err(field)?,
        dependencies: row.try_get("dependencies").map_err(field)?,
        deployed_at: row.try_get::<_, DateTime<Utc>>("deployed_at").map_err(field)?,
    })
}

#[async_trait::async_trait]
impl LedgerStore for PgLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        self.conn
            .lock()
            .await
            .batch_execute(&create_ledger_sql(&self.schema))
            .await?;
        info!(schema = %self.schema, "Ledger initialized");
        Ok(())
    }

    async fn begin(&self) -> MigrateResult<()> {
        Ok(self.conn.lock().await.begin().await?)
    }

    async fn commit(&self) -> MigrateResult<()> {
        Ok(self.conn.lock().await.commit().await?)
    }

    async fn rollback(&self) -> MigrateResult<()> {
        Ok(self.conn.lock().await.rollback().await?)
    }

    async fn is_deployed(&self, project: &str, change: &str) -> MigrateResult<bool> {
        let row = self
            .conn
            .lock()
            .await
            .query_opt(&self.queries.is_deployed, &[&project, &change])
            .await?;
        Ok(row.is_some())
    }

    async fn deployed(&self, project: Option<&str>) -> MigrateResult<Vec<LedgerRecord>> {
        Ok(self.records(&self.queries.deployed, project).await?)
    }

    async fn record_deploy(&self, record: &LedgerRecord) -> MigrateResult<()> {
        self.conn
            .lock()
            .await
            .execute(
                &self.queries.insert,
                &[
                    &record.project,
                    &record.change_name,
                    &record.script_hash,
                    &record.dependencies,
                    &record.deployed_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn remove_deploy(&self, project: &str, change: &str) -> MigrateResult<()> {
        self.conn
            .lock()
            .await
            .execute(&self.queries.delete, &[&project, &change])
            .await?;
        Ok(())
    }

    async fn dependents_of(&self, project: &str, change: &str) -> MigrateResult<Vec<LedgerRecord>> {
        let qualified = format!("{}:{}", project, change);
        Ok(self
            .records(&self.queries.dependents, Some(&qualified))
            .await?)
    }

    async fn find_by_hash(&self, hash: &str) -> MigrateResult<Option<LedgerRecord>> {
        let prefix = hash.to_ascii_lowercase();
        let rows = self.records(&self.queries.by_hash, Some(&prefix)).await?;
        Ok(rows.into_iter().next())
    }

    async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        Ok(self.conn.lock().await.batch_execute(sql).await?)
    }

    async fn status(&self, project: Option<&str>) -> MigrateResult<Vec<ProjectStatus>> {
        let records = self.records(&self.queries.deployed, project).await?;
        Ok(summarize(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("strata_migrate"), "\"strata_migrate\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_ledger_sql() {
        let sql = create_ledger_sql("ops");
        assert!(sql.starts_with("CREATE SCHEMA IF NOT EXISTS \"ops\";"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"ops\".changes"));
        assert!(sql.contains("dependencies TEXT[] NOT NULL DEFAULT '{}'"));
        assert!(sql.contains("UNIQUE (project, change_name)"));
    }

    #[test]
    fn test_queries_use_schema() {
        let queries = Queries::new("strata_migrate");
        assert!(queries.insert.starts_with("INSERT INTO \"strata_migrate\".changes"));
        assert!(queries.dependents.contains("$1 = ANY(dependencies)"));
        assert!(queries.deployed.ends_with("ORDER BY id"));
        assert!(queries.by_hash.contains("starts_with(script_hash, $1)"));
    }
}
