use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::config::settings::RepoSettings;
use crate::exec::CommandRunner;
use crate::select::Snapshot;

/// Client for the restic snapshot store. Repository coordinates and the
/// credential travel via `RESTIC_REPOSITORY`/`RESTIC_PASSWORD` on the child
/// process, never via argv.
pub struct SnapshotStore<'a> {
    runner: &'a dyn CommandRunner,
    repo: &'a RepoSettings,
}

/// The fields of `restic snapshots --json` this crate cares about.
#[derive(Debug, Deserialize)]
struct ResticSnapshot {
    #[serde(default)]
    id: String,
    short_id: Option<String>,
    time: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(runner: &'a dyn CommandRunner, repo: &'a RepoSettings) -> Self {
        Self { runner, repo }
    }

    fn env(&self) -> Vec<(String, String)> {
        vec![
            ("RESTIC_REPOSITORY".into(), self.repo.repository.clone()),
            ("RESTIC_PASSWORD".into(), self.repo.password.clone()),
        ]
    }

    fn scope_args<'b>(&'b self, args: &mut Vec<&'b str>) {
        if let Some(host) = &self.repo.host {
            args.push("--host");
            args.push(host);
        }
        for tag in &self.repo.tags {
            args.push("--tag");
            args.push(tag);
        }
    }

    /// Initialize the repository on first use. `restic cat config` fails on
    /// a repository that was never initialized; a wrong password also lands
    /// here, and then `restic init` reports the repository as existing.
    pub fn ensure_repository(&self) -> Result<()> {
        let probe = self.runner.run("restic", &["cat", "config"], &self.env())?;
        if probe.success() {
            return Ok(());
        }
        let init = self.runner.run("restic", &["init"], &self.env())?;
        if !init.success() {
            return Err(anyhow!("restic init: {}", init.error_line()));
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut args = vec!["snapshots", "--json"];
        self.scope_args(&mut args);
        let out = self.runner.run("restic", &args, &self.env())?;
        if !out.success() {
            return Err(anyhow!("restic snapshots: {}", out.error_line()));
        }

        // restic prints `null` instead of `[]` when nothing matches.
        let body = out.stdout.trim();
        if body.is_empty() || body == "null" {
            return Ok(Vec::new());
        }
        let raw: Vec<ResticSnapshot> =
            serde_json::from_str(body).context("parsing restic snapshot listing")?;
        raw.into_iter().map(Snapshot::try_from).collect()
    }

    pub fn backup(&self, dir: &Path) -> Result<()> {
        let dir = dir
            .to_str()
            .ok_or_else(|| anyhow!("target directory path is not valid UTF-8"))?;
        let mut args = vec!["backup", dir];
        self.scope_args(&mut args);
        let out = self.runner.run("restic", &args, &self.env())?;
        if !out.success() {
            return Err(anyhow!("restic backup: {}", out.error_line()));
        }
        Ok(())
    }

    /// Restore a snapshot to the absolute path it was captured from
    /// (`--target /`). Backup and restore must therefore run against the
    /// same target directory.
    pub fn restore(&self, id: &str) -> Result<()> {
        let out = self
            .runner
            .run("restic", &["restore", id, "--target", "/"], &self.env())?;
        if !out.success() {
            return Err(anyhow!("restic restore: {}", out.error_line()));
        }
        Ok(())
    }
}

impl TryFrom<ResticSnapshot> for Snapshot {
    type Error = anyhow::Error;

    fn try_from(raw: ResticSnapshot) -> Result<Self> {
        let id = raw.short_id.unwrap_or(raw.id);
        // Normalize at the boundary: anything restic reports must parse as
        // RFC3339 and is compared as a typed UTC instant from here on.
        let time: DateTime<Utc> = DateTime::parse_from_rfc3339(&raw.time)
            .with_context(|| format!("snapshot {} has a malformed time '{}'", id, raw.time))?
            .with_timezone(&Utc);
        Ok(Snapshot {
            id,
            time,
            tags: raw.tags,
        })
    }
}
