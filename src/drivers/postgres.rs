use anyhow::{Context, Result, anyhow};
use std::path::Path;

use crate::config::settings::PgSettings;
use crate::exec::CommandRunner;

const RELATION_COUNT_SQL: &str =
    "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'public'";

/// Client for the PostgreSQL tools. Connection parameters and the credential
/// are handed to `pg_dump`/`pg_restore`/`psql` through their standard `PG*`
/// environment variables.
pub struct RelationalStore<'a> {
    runner: &'a dyn CommandRunner,
    pg: &'a PgSettings,
}

impl<'a> RelationalStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, pg: &'a PgSettings) -> Self {
        Self { runner, pg }
    }

    fn env(&self) -> Vec<(String, String)> {
        vec![
            ("PGHOST".into(), self.pg.host.clone()),
            ("PGPORT".into(), self.pg.port.to_string()),
            ("PGDATABASE".into(), self.pg.database.clone()),
            ("PGUSER".into(), self.pg.user.clone()),
            ("PGPASSWORD".into(), self.pg.password.clone()),
        ]
    }

    /// Write a custom-format logical dump to `dest`.
    pub fn dump(&self, dest: &Path) -> Result<()> {
        let dest = dest
            .to_str()
            .ok_or_else(|| anyhow!("dump path is not valid UTF-8"))?;
        let out = self.runner.run(
            "pg_dump",
            &["--format=custom", "--file", dest],
            &self.env(),
        )?;
        if !out.success() {
            return Err(anyhow!("pg_dump: {}", out.error_line()));
        }
        Ok(())
    }

    /// Load a dump with clean-then-load semantics: `--clean --if-exists`
    /// drops conflicting objects before recreating them, which the custom
    /// archive format supports. A plain-text dump replayed through psql
    /// would apply statements directly and could stop partway through; this
    /// crate always dumps in custom format so that weaker mode never runs.
    pub fn restore(&self, dump: &Path) -> Result<()> {
        let dump = dump
            .to_str()
            .ok_or_else(|| anyhow!("dump path is not valid UTF-8"))?;
        let out = self.runner.run(
            "pg_restore",
            &[
                "--clean",
                "--if-exists",
                "--dbname",
                &self.pg.database,
                dump,
            ],
            &self.env(),
        )?;
        if !out.success() {
            return Err(anyhow!("pg_restore: {}", out.error_line()));
        }
        Ok(())
    }

    /// Count user-visible relations in the `public` schema.
    pub fn relation_count(&self) -> Result<u64> {
        let out = self.runner.run(
            "psql",
            &["--tuples-only", "--no-align", "--command", RELATION_COUNT_SQL],
            &self.env(),
        )?;
        if !out.success() {
            return Err(anyhow!("psql: {}", out.error_line()));
        }
        out.stdout
            .trim()
            .parse::<u64>()
            .with_context(|| format!("unexpected psql output '{}'", out.stdout.trim()))
    }
}
