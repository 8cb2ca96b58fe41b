//! Shared state for commands: config, workspace, and the database.

use std::path::{Path, PathBuf};

use strata_migrate::{FsScriptSource, MigrationConfig, MigrationEngine, Workspace};
use strata_postgres::{PgLedger, PgPool};
use tracing::debug;

use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Engine type used by the binary.
pub type Engine = MigrationEngine<PgLedger, FsScriptSource>;

/// Everything a command needs before touching the database.
#[derive(Debug)]
pub struct Context {
    /// Directory the command was run from.
    pub cwd: PathBuf,
    /// Loaded configuration.
    pub config: Config,
    /// Discovered packages.
    pub workspace: Workspace,
    /// `--database-url`, if given.
    pub database_url: Option<String>,
}

impl Context {
    /// Discover the workspace configured in `config`.
    ///
    /// A relative `[workspace] root` is taken from `base`, the directory
    /// holding the config file.
    pub fn new(config: Config, base: &Path, database_url: Option<String>) -> CliResult<Self> {
        let cwd = std::env::current_dir()?;
        let root = config.workspace_root(base);
        let workspace = Workspace::discover(&root)?;
        debug!(root = %root.display(), packages = workspace.len(), "Workspace loaded");

        Ok(Self {
            cwd,
            config,
            workspace,
            database_url,
        })
    }

    /// The package a command works on.
    ///
    /// Falls back to the package containing the current directory, then to
    /// the only package of the workspace.
    pub fn package(&self, name: Option<&str>) -> CliResult<String> {
        if let Some(name) = name {
            self.workspace.package(name)?;
            return Ok(name.to_string());
        }

        if let Some(package) = self.workspace.package_at(&self.cwd) {
            return Ok(package.name.clone());
        }

        let mut packages = self.workspace.packages();
        match (packages.next(), packages.next()) {
            (Some(only), None) => Ok(only.name.clone()),
            (None, _) => Err(CliError::command(format!(
                "no packages found under {}",
                self.workspace.root().display()
            ))),
            _ => Err(CliError::command(
                "several packages found; name the one to use",
            )),
        }
    }

    /// The database URL: `--database-url`, then `DATABASE_URL`, then the config.
    pub fn database_url(&self) -> CliResult<String> {
        match &self.database_url {
            Some(url) => Ok(url.clone()),
            None => self.config.database_url(),
        }
    }

    /// Connect to the database and build an engine over the workspace.
    pub async fn connect(&self) -> CliResult<Database> {
        let pool = PgPool::from_url(&self.database_url()?)?;
        let ledger = PgLedger::connect(&pool, self.config.deploy.ledger_schema.as_str()).await?;

        let engine = MigrationEngine::new(
            MigrationConfig::new()
                .use_transaction(self.config.deploy.use_transaction)
                .ledger_schema(self.config.deploy.ledger_schema.as_str()),
            self.workspace.clone(),
            FsScriptSource::new(),
            ledger,
        );
        engine.initialize().await?;

        Ok(Database {
            pool,
            engine,
            lock: self.config.deploy.lock,
        })
    }
}

/// A connected engine.
pub struct Database {
    pool: PgPool,
    /// The engine, backed by a [`PgLedger`].
    pub engine: Engine,
    lock: bool,
}

impl Database {
    /// Connection string with the password masked.
    pub fn display_url(&self) -> String {
        self.pool.config().display_url()
    }

    /// Take the migration lock if configured.
    pub async fn lock(&self) -> CliResult<()> {
        if self.lock {
            self.engine.ledger().acquire_lock().await?;
        }
        Ok(())
    }

    /// Release the migration lock if configured.
    pub async fn unlock(&self) -> CliResult<()> {
        if self.lock {
            self.engine.ledger().release_lock().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_migrate::PackageInfo;

    fn context(workspace: Workspace, cwd: &str) -> Context {
        Context {
            cwd: PathBuf::from(cwd),
            config: Config::default(),
            workspace,
            database_url: None,
        }
    }

    #[test]
    fn test_package_selection() {
        let workspace = Workspace::new("/ws")
            .with_package(PackageInfo::new("app", "/ws/app"))
            .with_package(PackageInfo::new("auth", "/ws/auth"));

        let ctx = context(workspace.clone(), "/ws/auth/deploy");
        assert_eq!(ctx.package(None).unwrap(), "auth");
        assert_eq!(ctx.package(Some("app")).unwrap(), "app");
        assert!(ctx.package(Some("billing")).is_err());

        let ctx = context(workspace, "/ws");
        assert!(ctx.package(None).is_err());

        let single = Workspace::new("/ws").with_package(PackageInfo::new("app", "/ws/app"));
        assert_eq!(context(single, "/elsewhere").package(None).unwrap(), "app");
    }

    #[test]
    fn test_database_url_flag_wins() {
        let mut ctx = context(Workspace::new("/ws"), "/ws");
        ctx.config.database.url = Some("postgresql://config/db".to_string());
        ctx.database_url = Some("postgresql://flag/db".to_string());
        assert_eq!(ctx.database_url().unwrap(), "postgresql://flag/db");
    }
}
