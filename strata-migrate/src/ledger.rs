//! The change ledger: which changes are deployed where.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// A deployed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Package the change belongs to.
    pub project: String,
    /// Change name.
    pub change_name: String,
    /// SHA-256 of the deploy script at deploy time.
    pub script_hash: String,
    /// Dependencies as `project:change`.
    pub dependencies: Vec<String>,
    /// When the change was deployed.
    pub deployed_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        project: impl Into<String>,
        change_name: impl Into<String>,
        script_hash: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            project: project.into(),
            change_name: change_name.into(),
            script_hash: script_hash.into(),
            dependencies,
            deployed_at: Utc::now(),
        }
    }

    /// `project:change`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.project, self.change_name)
    }
}

/// Deployment summary of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    /// Project name.
    pub project: String,
    /// Number of deployed changes.
    pub deployed_count: usize,
    /// Most recently deployed change.
    pub last_change: Option<String>,
    /// When it was deployed.
    pub last_deployed_at: Option<DateTime<Utc>>,
}

/// Persistent ledger plus the database scripts run against.
///
/// `begin`/`commit`/`rollback` bracket a unit of work; everything between
/// them, ledger writes and script execution alike, succeeds or fails
/// together.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the ledger table if needed.
    async fn initialize(&self) -> MigrateResult<()>;

    /// Start a transaction.
    async fn begin(&self) -> MigrateResult<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> MigrateResult<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> MigrateResult<()>;

    /// Whether `project:change` has a ledger row.
    async fn is_deployed(&self, project: &str, change: &str) -> MigrateResult<bool>;

    /// Deployed records, oldest first, optionally for one project.
    async fn deployed(&self, project: Option<&str>) -> MigrateResult<Vec<LedgerRecord>>;

    /// Insert a ledger row.
    async fn record_deploy(&self, record: &LedgerRecord) -> MigrateResult<()>;

    /// Delete a ledger row.
    async fn remove_deploy(&self, project: &str, change: &str) -> MigrateResult<()>;

    /// Records that list `project:change` among their dependencies.
    async fn dependents_of(&self, project: &str, change: &str) -> MigrateResult<Vec<LedgerRecord>>;

    /// First deployed record whose script hash starts with `hash`,
    /// compared case-insensitively.
    async fn find_by_hash(&self, hash: &str) -> MigrateResult<Option<LedgerRecord>>;

    /// Run a script.
    async fn execute_script(&self, sql: &str) -> MigrateResult<()>;

    /// Per-project summary, optionally for one project.
    async fn status(&self, project: Option<&str>) -> MigrateResult<Vec<ProjectStatus>>;
}

/// Summarize records (oldest first) per project, in first-seen order.
pub fn summarize(records: &[LedgerRecord]) -> Vec<ProjectStatus> {
    let mut statuses: Vec<ProjectStatus> = Vec::new();

    for record in records {
        let status = match statuses.iter_mut().find(|s| s.project == record.project) {
            Some(status) => status,
            None => {
                statuses.push(ProjectStatus {
                    project: record.project.clone(),
                    deployed_count: 0,
                    last_change: None,
                    last_deployed_at: None,
                });
                let last = statuses.len() - 1;
                &mut statuses[last]
            }
        };

        status.deployed_count += 1;
        status.last_change = Some(record.change_name.clone());
        status.last_deployed_at = Some(record.deployed_at);
    }

    statuses
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<LedgerRecord>,
    snapshot: Option<Vec<LedgerRecord>>,
    executed: Vec<String>,
    fail_markers: Vec<String>,
}

/// In-memory [`LedgerStore`].
///
/// Transactions snapshot the ledger on `begin` and restore it on `rollback`.
/// Scripts are recorded rather than run; a script containing a marker
/// registered with [`fail_on`](Self::fail_on) fails.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any script containing `marker` fail.
    pub fn fail_on(&self, marker: impl Into<String>) {
        self.state.lock().fail_markers.push(marker.into());
    }

    /// Stop failing scripts.
    pub fn clear_failures(&self) {
        self.state.lock().fail_markers.clear();
    }

    /// Every script executed so far, including rolled back ones.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Current ledger rows.
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.state.lock().records.clone()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn begin(&self) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return Err(MigrationError::database("transaction already open"));
        }
        state.snapshot = Some(state.records.clone());
        Ok(())
    }

    async fn commit(&self) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| MigrationError::database("no transaction to commit"))
    }

    async fn rollback(&self) -> MigrateResult<()> {
        let mut state = self.state.lock();
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| MigrationError::database("no transaction to roll back"))?;
        state.records = snapshot;
        Ok(())
    }

    async fn is_deployed(&self, project: &str, change: &str) -> MigrateResult<bool> {
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .any(|r| r.project == project && r.change_name == change))
    }

    async fn deployed(&self, project: Option<&str>) -> MigrateResult<Vec<LedgerRecord>> {
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .filter(|r| project.is_none_or(|p| r.project == p))
            .cloned()
            .collect())
    }

    async fn record_deploy(&self, record: &LedgerRecord) -> MigrateResult<()> {
        let mut state = self.state.lock();
        if state
            .records
            .iter()
            .any(|r| r.project == record.project && r.change_name == record.change_name)
        {
            return Err(MigrationError::database(format!(
                "duplicate key: {} is already deployed",
                record.qualified_name()
            )));
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn remove_deploy(&self, project: &str, change: &str) -> MigrateResult<()> {
        self.state
            .lock()
            .records
            .retain(|r| !(r.project == project && r.change_name == change));
        Ok(())
    }

    async fn dependents_of(&self, project: &str, change: &str) -> MigrateResult<Vec<LedgerRecord>> {
        let qualified = format!("{}:{}", project, change);
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .filter(|r| r.dependencies.contains(&qualified))
            .cloned()
            .collect())
    }

    async fn find_by_hash(&self, hash: &str) -> MigrateResult<Option<LedgerRecord>> {
        let prefix = hash.to_ascii_lowercase();
        Ok(self
            .state
            .lock()
            .records
            .iter()
            .find(|r| r.script_hash.starts_with(&prefix))
            .cloned())
    }

    async fn execute_script(&self, sql: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());
        if let Some(marker) = state.fail_markers.iter().find(|m| sql.contains(m.as_str())) {
            return Err(MigrationError::database(format!(
                "script failed on `{}`",
                marker
            )));
        }
        Ok(())
    }

    async fn status(&self, project: Option<&str>) -> MigrateResult<Vec<ProjectStatus>> {
        let records = self.deployed(project).await?;
        Ok(summarize(&records))
    }
}
