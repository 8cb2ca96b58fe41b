//! Migration engine implementation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Instant;

use strata_plan::{Change, PlanCache, is_content_hash};
use tracing::{debug, info, trace, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::file::{FsScriptSource, ScriptKind, ScriptSource, script_hash};
use crate::graph::{GraphBuilder, ResolveOptions, TagResolution};
use crate::ledger::{LedgerRecord, LedgerStore, ProjectStatus};
use crate::resolver::{PackageOrder, Resolution};
use crate::workspace::Workspace;

/// Hash recorded in integrity failures when the local deploy script is gone.
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Whether deploy and revert run inside one transaction by default.
    pub use_transaction: bool,
    /// Schema holding the ledger table.
    pub ledger_schema: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            use_transaction: true,
            ledger_schema: "strata_migrate".to_string(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default transaction mode.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    /// Set the ledger schema.
    pub fn ledger_schema(mut self, schema: impl Into<String>) -> Self {
        self.ledger_schema = schema.into();
        self
    }
}

/// Per-call options for deploy, revert, and verify.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Stop at this change of the target package (any reference form).
    pub to_change: Option<String>,
    /// Override [`MigrationConfig::use_transaction`].
    pub use_transaction: Option<bool>,
}

impl ExecutionOptions {
    /// Options using the engine defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop at `change`.
    pub fn to_change(mut self, change: impl Into<String>) -> Self {
        self.to_change = Some(change.into());
        self
    }

    /// Run inside a transaction or not.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = Some(use_transaction);
        self
    }
}

/// Result of a deploy or revert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeReport {
    /// Changes deployed or reverted, in execution order.
    pub changes: Vec<String>,
    /// Changes left alone because they were already in the requested state.
    pub skipped: Vec<String>,
    /// The change whose script failed.
    pub failed: Option<String>,
    /// Why the call failed.
    pub error: Option<String>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
}

impl ChangeReport {
    /// Whether the call completed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Turn a failed report into an error.
    pub fn into_result(self) -> MigrateResult<Self> {
        match &self.error {
            None => Ok(self),
            Some(message) => Err(MigrationError::execution(
                self.failed.clone().unwrap_or_default(),
                message.clone(),
            )),
        }
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.changes.is_empty() {
            parts.push(format!("{} changed", self.changes.len()));
        }

        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }

        if let Some(failed) = &self.failed {
            parts.push(format!("failed at {}", failed));
        }

        if parts.is_empty() {
            "Nothing to do".to_string()
        } else {
            format!("{} in {}ms", parts.join(", "), self.duration_ms)
        }
    }
}

/// What went wrong when verifying one change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// The deploy script changed since it was deployed.
    HashMismatch {
        /// Hash in the ledger.
        expected: String,
        /// Hash of the local script, or [`FILE_NOT_FOUND`].
        actual: String,
    },
    /// The change has no verify script.
    MissingVerifyScript,
    /// The verify script failed.
    VerifyFailed {
        /// Driver error message.
        message: String,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashMismatch { expected, actual } => {
                write!(f, "deploy script hash mismatch (ledger {}, local {})", expected, actual)
            }
            Self::MissingVerifyScript => write!(f, "verify script not found"),
            Self::VerifyFailed { message } => write!(f, "verify failed: {}", message),
        }
    }
}

/// An integrity failure for a deployed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityFailure {
    /// The change, `package:change` outside the target package.
    pub change: String,
    /// What was wrong.
    pub issue: IntegrityIssue,
}

/// Result of a verify.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Changes that passed every check.
    pub verified: Vec<String>,
    /// Every failure found.
    pub failed: Vec<IntegrityFailure>,
}

impl VerifyReport {
    /// Whether every change passed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("{} verified", self.verified.len())
        } else {
            format!(
                "{} verified, {} failed",
                self.verified.len(),
                self.failed.len()
            )
        }
    }
}

/// Pending work of a deploy, computed without executing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployPlan {
    /// Native extensions the package set needs.
    pub natives: Vec<String>,
    /// Changes that would be deployed, in order.
    pub changes: Vec<String>,
}

/// Changes of one package, dependencies first.
struct PackageChanges {
    package: String,
    changes: Vec<Change>,
}

/// A change scheduled for revert.
struct RevertTarget {
    package: String,
    change: String,
    label: String,
}

/// The migration engine.
pub struct MigrationEngine<L: LedgerStore, S: ScriptSource = FsScriptSource> {
    config: MigrationConfig,
    workspace: Workspace,
    source: S,
    ledger: L,
    cache: PlanCache,
}

impl<L: LedgerStore, S: ScriptSource> MigrationEngine<L, S> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, workspace: Workspace, source: S, ledger: L) -> Self {
        Self {
            config,
            workspace,
            source,
            ledger,
            cache: PlanCache::new(),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// The workspace packages come from.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// The script source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The ledger store.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The plan cache.
    pub fn cache(&self) -> &PlanCache {
        &self.cache
    }

    /// Drop cached plans so edits on disk are picked up.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.workspace, &self.source, &self.cache)
    }

    /// Create the ledger.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.ledger.initialize().await
    }

    /// Resolve the changes of `package` in dependency order.
    pub fn resolve_dependencies(
        &self,
        package: &str,
        options: ResolveOptions,
    ) -> MigrateResult<Resolution> {
        self.builder().resolve_dependencies(package, options)
    }

    /// Resolve the packages `package` needs.
    pub fn resolve_packages(&self, package: &str) -> MigrateResult<PackageOrder> {
        self.builder().resolve_packages(package)
    }

    /// Changes a deploy of `package` would run.
    pub async fn plan_changes(
        &self,
        package: &str,
        options: &ExecutionOptions,
    ) -> MigrateResult<DeployPlan> {
        let builder = self.builder();
        let order = builder.resolve_packages(package)?;
        let target = self.target_change(&builder, package, options)?;
        let batches = self.ordered_changes(&builder, &order.packages)?;

        let mut pending = Vec::new();
        for batch in &batches {
            let pkg = batch.package.as_str();
            for change in &batch.changes {
                if !self.ledger.is_deployed(pkg, &change.name).await? {
                    pending.push(label(pkg, &change.name, package));
                }
                if pkg == package && target.as_deref() == Some(change.name.as_str()) {
                    break;
                }
            }
        }

        Ok(DeployPlan {
            natives: order.natives,
            changes: pending,
        })
    }

    /// Deploy `package` and everything it requires.
    ///
    /// Every package is resolved before anything runs, so a cycle or a
    /// missing dependency fails without touching the database. Script
    /// failures end up in the returned report; use
    /// [`ChangeReport::into_result`] to treat them as errors.
    pub async fn deploy(
        &self,
        package: &str,
        options: &ExecutionOptions,
    ) -> MigrateResult<ChangeReport> {
        let start = Instant::now();
        let builder = self.builder();
        let order = builder.resolve_packages(package)?;
        let target = self.target_change(&builder, package, options)?;
        let batches = self.ordered_changes(&builder, &order.packages)?;
        let use_transaction = options.use_transaction.unwrap_or(self.config.use_transaction);

        debug!(
            package,
            packages = ?order.packages,
            natives = ?order.natives,
            use_transaction,
            "Deploying"
        );

        let mut report = ChangeReport::default();
        if use_transaction {
            self.ledger.begin().await?;
        }

        let outcome = self
            .deploy_packages(
                &builder,
                &order.natives,
                &batches,
                package,
                target.as_deref(),
                use_transaction,
                &mut report,
            )
            .await;

        self.finish(outcome, use_transaction, &mut report).await?;
        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    async fn deploy_packages(
        &self,
        builder: &GraphBuilder<'_>,
        natives: &[String],
        batches: &[PackageChanges],
        package: &str,
        target: Option<&str>,
        use_transaction: bool,
        report: &mut ChangeReport,
    ) -> MigrateResult<()> {
        for native in natives {
            debug!(extension = %native, "Creating extension");
            self.ledger
                .execute_script(&create_extension_sql(native))
                .await?;
        }

        for batch in batches {
            let pkg = &batch.package;
            let info = self.workspace.package(pkg)?;

            for change in &batch.changes {
                let label = label(pkg, &change.name, package);

                if self.ledger.is_deployed(pkg, &change.name).await? {
                    debug!(change = %label, "Already deployed");
                    report.skipped.push(label);
                } else {
                    report.failed = Some(label.clone());

                    let script = self
                        .source
                        .read_script(&info.root, ScriptKind::Deploy, &change.name)?
                        .ok_or_else(|| MigrationError::ScriptNotFound {
                            kind: ScriptKind::Deploy.to_string(),
                            change: label.clone(),
                        })?;

                    let dependencies = change
                        .dependencies
                        .iter()
                        .map(|token| builder.qualify(token, pkg))
                        .collect::<MigrateResult<Vec<_>>>()?;
                    self.check_hash_dependencies(&dependencies, &label).await?;

                    let record = LedgerRecord::new(
                        pkg.as_str(),
                        change.name.as_str(),
                        script_hash(&script),
                        dependencies,
                    );
                    self.ledger.record_deploy(&record).await?;

                    if let Err(e) = self.ledger.execute_script(&script).await {
                        if !use_transaction {
                            self.ledger.remove_deploy(pkg, &change.name).await?;
                        }
                        return Err(MigrationError::execution(label, e.to_string()));
                    }

                    info!(change = %label, "Deployed");
                    report.failed = None;
                    report.changes.push(label);
                }

                if pkg.as_str() == package && target == Some(change.name.as_str()) {
                    debug!(change = %change.name, "Reached target change");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Content-hash dependencies must match a deployed script.
    async fn check_hash_dependencies(
        &self,
        dependencies: &[String],
        label: &str,
    ) -> MigrateResult<()> {
        for hash in dependencies.iter().filter(|d| is_content_hash(d)) {
            let Some(record) = self.ledger.find_by_hash(hash).await? else {
                return Err(MigrationError::module_not_found(hash.as_str(), Some(label)));
            };
            trace!(
                change = %label,
                hash = %hash,
                target = %record.qualified_name(),
                "Hash dependency"
            );
        }
        Ok(())
    }

    /// Revert `package`.
    ///
    /// With a target change only the package's later changes are reverted;
    /// without one the whole package set is reverted and its extensions
    /// dropped. Nothing is touched if a deployed change outside the batch
    /// still requires one of the candidates.
    pub async fn revert(
        &self,
        package: &str,
        options: &ExecutionOptions,
    ) -> MigrateResult<ChangeReport> {
        let start = Instant::now();
        let builder = self.builder();
        let order = builder.resolve_packages(package)?;
        let target = self.target_change(&builder, package, options)?;
        let use_transaction = options.use_transaction.unwrap_or(self.config.use_transaction);

        let packages: Vec<String> = match &target {
            Some(_) => vec![package.to_string()],
            None => order.packages.iter().rev().cloned().collect(),
        };
        let batches = self.ordered_changes(&builder, &packages)?;

        let mut report = ChangeReport::default();
        let mut candidates = Vec::new();

        for batch in &batches {
            let pkg = &batch.package;
            let changes: Vec<&Change> = match &target {
                Some(target) => batch
                    .changes
                    .iter()
                    .skip_while(|c| &c.name != target)
                    .skip(1)
                    .collect(),
                None => batch.changes.iter().collect(),
            };

            for change in changes.into_iter().rev() {
                let label = label(pkg, &change.name, package);
                if self.ledger.is_deployed(pkg, &change.name).await? {
                    candidates.push(RevertTarget {
                        package: pkg.clone(),
                        change: change.name.clone(),
                        label,
                    });
                } else {
                    debug!(change = %label, "Not deployed");
                    report.skipped.push(label);
                }
            }
        }

        self.check_dependents(&candidates).await?;

        let drop_natives = target.is_none();
        debug!(
            package,
            candidates = candidates.len(),
            drop_natives,
            use_transaction,
            "Reverting"
        );

        if use_transaction {
            self.ledger.begin().await?;
        }

        let natives = drop_natives.then_some(order.natives.as_slice());
        let outcome = self.revert_changes(&candidates, natives, &mut report).await;

        self.finish(outcome, use_transaction, &mut report).await?;
        report.duration_ms = start.elapsed().as_millis() as i64;
        Ok(report)
    }

    async fn check_dependents(&self, candidates: &[RevertTarget]) -> MigrateResult<()> {
        let batch: HashSet<(&str, &str)> = candidates
            .iter()
            .map(|c| (c.package.as_str(), c.change.as_str()))
            .collect();

        let deployed = self.ledger.deployed(None).await?;
        let hashes: HashMap<(&str, &str), &str> = deployed
            .iter()
            .map(|r| ((r.project.as_str(), r.change_name.as_str()), r.script_hash.as_str()))
            .collect();

        for candidate in candidates {
            let mut dependents = self
                .ledger
                .dependents_of(&candidate.package, &candidate.change)
                .await?;
            let key = (candidate.package.as_str(), candidate.change.as_str());
            if let Some(hash) = hashes.get(&key) {
                dependents.extend(deployed.iter().filter(|r| requires_hash(r, hash)).cloned());
            }

            if let Some(dependent) = dependents.into_iter().find(|d| {
                !batch.contains(&(d.project.as_str(), d.change_name.as_str()))
            }) {
                warn!(
                    change = %candidate.label,
                    dependent = %dependent.qualified_name(),
                    "Revert blocked by dependent change"
                );
                return Err(MigrationError::RevertProtected {
                    change: candidate.label.clone(),
                    dependent_project: dependent.project,
                    dependent_change: dependent.change_name,
                });
            }
        }

        Ok(())
    }

    async fn revert_changes(
        &self,
        candidates: &[RevertTarget],
        natives: Option<&[String]>,
        report: &mut ChangeReport,
    ) -> MigrateResult<()> {
        for candidate in candidates {
            report.failed = Some(candidate.label.clone());

            let info = self.workspace.package(&candidate.package)?;
            let script = self
                .source
                .read_script(&info.root, ScriptKind::Revert, &candidate.change)?
                .ok_or_else(|| MigrationError::ScriptNotFound {
                    kind: ScriptKind::Revert.to_string(),
                    change: candidate.label.clone(),
                })?;

            self.ledger
                .execute_script(&script)
                .await
                .map_err(|e| MigrationError::execution(&candidate.label, e.to_string()))?;
            self.ledger
                .remove_deploy(&candidate.package, &candidate.change)
                .await?;

            info!(change = %candidate.label, "Reverted");
            report.failed = None;
            report.changes.push(candidate.label.clone());
        }

        for native in natives.into_iter().flatten().rev() {
            debug!(extension = %native, "Dropping extension");
            self.ledger.execute_script(&drop_extension_sql(native)).await?;
        }

        Ok(())
    }

    /// Verify deployed changes of `package` and everything it requires.
    ///
    /// Failures are collected; verification never stops early.
    pub async fn verify(
        &self,
        package: &str,
        options: &ExecutionOptions,
    ) -> MigrateResult<VerifyReport> {
        let builder = self.builder();
        let order = builder.resolve_packages(package)?;
        let target = self.target_change(&builder, package, options)?;
        let batches = self.ordered_changes(&builder, &order.packages)?;
        let mut report = VerifyReport::default();

        for batch in &batches {
            let pkg = batch.package.as_str();
            let info = self.workspace.package(pkg)?;
            let records: HashMap<String, LedgerRecord> = self
                .ledger
                .deployed(Some(pkg))
                .await?
                .into_iter()
                .map(|r| (r.change_name.clone(), r))
                .collect();

            for change in &batch.changes {
                if let Some(record) = records.get(&change.name) {
                    let label = label(pkg, &change.name, package);
                    let issues = self.verify_change(info.root.as_path(), record).await?;

                    if issues.is_empty() {
                        debug!(change = %label, "Verified");
                        report.verified.push(label);
                    } else {
                        for issue in issues {
                            warn!(change = %label, issue = %issue, "Integrity failure");
                            report.failed.push(IntegrityFailure {
                                change: label.clone(),
                                issue,
                            });
                        }
                    }
                }

                if pkg == package && target.as_deref() == Some(change.name.as_str()) {
                    break;
                }
            }
        }

        info!(package, summary = %report.summary(), "Verify finished");
        Ok(report)
    }

    async fn verify_change(
        &self,
        root: &Path,
        record: &LedgerRecord,
    ) -> MigrateResult<Vec<IntegrityIssue>> {
        let mut issues = Vec::new();

        let actual = self
            .source
            .read_script(root, ScriptKind::Deploy, &record.change_name)?
            .map(|script| script_hash(&script))
            .unwrap_or_else(|| FILE_NOT_FOUND.to_string());
        if actual != record.script_hash {
            issues.push(IntegrityIssue::HashMismatch {
                expected: record.script_hash.clone(),
                actual,
            });
        }

        match self
            .source
            .read_script(root, ScriptKind::Verify, &record.change_name)?
        {
            None => issues.push(IntegrityIssue::MissingVerifyScript),
            Some(script) => {
                // Verify scripts never leave anything behind.
                self.ledger.begin().await?;
                let outcome = self.ledger.execute_script(&script).await;
                self.ledger.rollback().await?;
                if let Err(e) = outcome {
                    issues.push(IntegrityIssue::VerifyFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(issues)
    }

    /// Deployment summary, optionally for one project.
    pub async fn status(&self, project: Option<&str>) -> MigrateResult<Vec<ProjectStatus>> {
        self.ledger.status(project).await
    }

    /// The changes of each package in resolved dependency order.
    fn ordered_changes(
        &self,
        builder: &GraphBuilder<'_>,
        packages: &[String],
    ) -> MigrateResult<Vec<PackageChanges>> {
        packages
            .iter()
            .map(|pkg| {
                let plan = builder.load_plan(pkg)?;
                let options = ResolveOptions::new().tag_resolution(TagResolution::Resolve);
                let resolution = builder.resolve_dependencies(pkg, options)?;
                let changes = resolution
                    .resolved
                    .iter()
                    .filter_map(|name| plan.change(name).cloned())
                    .collect();
                Ok(PackageChanges {
                    package: pkg.clone(),
                    changes,
                })
            })
            .collect()
    }

    fn target_change(
        &self,
        builder: &GraphBuilder<'_>,
        package: &str,
        options: &ExecutionOptions,
    ) -> MigrateResult<Option<String>> {
        options
            .to_change
            .as_deref()
            .map(|token| builder.resolve_change(token, package))
            .transpose()
    }

    /// Commit or roll back after a deploy or revert body ran.
    async fn finish(
        &self,
        outcome: MigrateResult<()>,
        use_transaction: bool,
        report: &mut ChangeReport,
    ) -> MigrateResult<()> {
        match outcome {
            Ok(()) => {
                if use_transaction {
                    self.ledger.commit().await?;
                }
            }
            Err(e) => {
                warn!(error = %e, failed = ?report.failed, "Rolling back");
                if use_transaction {
                    self.ledger.rollback().await?;
                    report.changes.clear();
                }
                report.error = Some(match e {
                    MigrationError::Execution { message, .. } => message,
                    other => other.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn label(package: &str, change: &str, target: &str) -> String {
    if package == target {
        change.to_string()
    } else {
        format!("{}:{}", package, change)
    }
}

/// Whether `record` depends on the script hashed to `hash` by content.
fn requires_hash(record: &LedgerRecord, hash: &str) -> bool {
    record
        .dependencies
        .iter()
        .any(|d| is_content_hash(d) && hash.starts_with(&d.to_ascii_lowercase()))
}

/// SQL creating a native extension.
pub fn create_extension_sql(name: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS \"{}\" CASCADE;", name)
}

/// SQL dropping a native extension.
pub fn drop_extension_sql(name: &str) -> String {
    format!("DROP EXTENSION IF EXISTS \"{}\";", name)
}
