//! # strata
//!
//! Dependency-aware schema migrations for PostgreSQL.
//!
//! strata provides:
//! - A plan format declaring each package's ordered changes and tags
//! - Change references (`@tag`, `HEAD^`, `pkg:change`) resolved against a plan
//! - Dependency resolution across packages, from plans or script headers
//! - A deploy/revert/verify engine that records what ran in a ledger
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//! use strata::postgres::{PgLedger, PgPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::from_url("postgresql://localhost/app")?;
//!     let ledger = PgLedger::connect(&pool, "strata_migrate").await?;
//!
//!     let engine = MigrationEngine::new(
//!         MigrationConfig::new(),
//!         Workspace::discover("db")?,
//!         FsScriptSource::new(),
//!         ledger,
//!     );
//!     engine.initialize().await?;
//!
//!     let report = engine.deploy("app", &ExecutionOptions::new()).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Plan parsing, writing, and reference resolution.
pub mod plan {
    pub use strata_plan::*;
}

/// Dependency resolution and the migration engine.
pub mod migrate {
    pub use strata_migrate::*;
}

/// PostgreSQL ledger and connection pool.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use strata_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ChangeReport, ExecutionOptions, FsScriptSource, GraphSource, LedgerStore, MemoryLedger,
        MigrationConfig, MigrationEngine, MigrationError, ResolveOptions, TagResolution,
        VerifyReport, Workspace,
    };
    pub use crate::plan::{Change, Plan, PlanError, Tag, parse_plan, parse_plan_file, write_plan};
}

// Re-export key types at the crate root
pub use migrate::{MigrationEngine, MigrationError, Workspace};
pub use plan::{Plan, PlanError};
