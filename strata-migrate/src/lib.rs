//! # strata-migrate
//!
//! Dependency resolution and the migration engine for strata.
//!
//! This crate provides functionality for:
//! - Discovering packages in a workspace (`strata.package.toml`)
//! - Building change graphs from plans or from script `-- requires:` headers
//! - Topological resolution with cycle detection and external dependencies
//! - Deploying, reverting, and verifying changes against a [`LedgerStore`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ strata.plan  │────▶│ GraphBuilder   │────▶│ Resolver    │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ LedgerStore    │◀────│ Engine      │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{
//!     ExecutionOptions, FsScriptSource, MemoryLedger, MigrationConfig, MigrationEngine, Workspace,
//! };
//!
//! async fn deploy() -> Result<(), Box<dyn std::error::Error>> {
//!     let workspace = Workspace::discover("./db")?;
//!     let engine = MigrationEngine::new(
//!         MigrationConfig::new(),
//!         workspace,
//!         FsScriptSource::new(),
//!         MemoryLedger::new(),
//!     );
//!
//!     engine.initialize().await?;
//!     let report = engine
//!         .deploy("app", &ExecutionOptions::new().to_change("@v1.0"))
//!         .await?
//!         .into_result()?;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Package Layout
//!
//! ```text
//! db/
//! ├── auth/
//! │   ├── strata.package.toml
//! │   ├── strata.plan
//! │   ├── deploy/users.sql
//! │   ├── revert/users.sql
//! │   └── verify/users.sql
//! └── app/
//!     └── ...
//! ```

pub mod engine;
pub mod error;
pub mod file;
pub mod graph;
pub mod header;
pub mod ledger;
pub mod resolver;
pub mod workspace;

// Re-exports
pub use engine::{
    ChangeReport, DeployPlan, ExecutionOptions, FILE_NOT_FOUND, IntegrityFailure, IntegrityIssue,
    MigrationConfig, MigrationEngine, VerifyReport,
};
pub use error::{MigrateResult, MigrationError};
pub use file::{FsScriptSource, MemoryScriptSource, ScriptKind, ScriptSource, script_hash};
pub use graph::{DependencyGraph, GraphBuilder, GraphSource, ResolveOptions, TagResolution};
pub use header::{ScriptHeader, parse_header, render_header};
pub use ledger::{LedgerRecord, LedgerStore, MemoryLedger, ProjectStatus};
pub use resolver::{PackageOrder, Resolution, Resolver};
pub use workspace::{MANIFEST_FILE, PLAN_FILE, PackageInfo, PackageManifest, Workspace};
