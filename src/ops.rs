use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::config::settings::{ConfigError, Settings};
use crate::drivers::postgres::RelationalStore;
use crate::drivers::restic::SnapshotStore;
use crate::exec::CommandRunner;
use crate::notify::Notifier;
use crate::probe;
use crate::select::{self, DumpEntry};

/// Terminal state of one orchestration run. Failure is the error path; a
/// skip is a normal, successful exit.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Success,
    Skipped(String),
}

pub fn do_backup(cfg: &Settings, runner: &dyn CommandRunner) -> Result<Outcome> {
    preflight(cfg, runner)?;
    attempt_backup(cfg, runner)
}

pub fn do_restore(
    cfg: &Settings,
    runner: &dyn CommandRunner,
    before: Option<&str>,
) -> Result<Outcome> {
    preflight(cfg, runner)?;
    let cutoff = before.map(select::parse_cutoff).transpose()?;

    let notifier = Notifier::from_settings(cfg);
    match restore_once(cfg, runner, cutoff) {
        Ok(Outcome::Skipped(reason)) => {
            println!(
                "{} {}",
                "i".yellow().bold(),
                format!("Restore skipped: {}", reason).yellow()
            );
            Ok(Outcome::Skipped(reason))
        }
        Ok(Outcome::Success) => {
            if cfg.notify_on_success {
                notifier.send("packrat restore succeeded", "restore completed");
            }
            Ok(Outcome::Success)
        }
        Err(err) => {
            notifier.send("packrat restore failed", &format!("{err:#}"));
            Err(err)
        }
    }
}

/// Foreground scheduling mode: one independent backup attempt per interval.
/// A failed attempt is reported and the loop keeps going; only a missing
/// tool or bad configuration stops the process.
pub fn do_schedule(cfg: &Settings, runner: &dyn CommandRunner, every: &str) -> Result<Outcome> {
    let every = humantime::parse_duration(every).map_err(|e| ConfigError::Invalid {
        key: "--schedule".into(),
        reason: e.to_string(),
    })?;
    preflight(cfg, runner)?;

    println!(
        "{} {}",
        "i".yellow().bold(),
        format!("Running backup every {}", humantime::format_duration(every)).yellow()
    );
    loop {
        let started = Instant::now();
        if let Err(err) = attempt_backup(cfg, runner) {
            eprintln!(
                "{} {} {:#}",
                timestamp().dimmed(),
                "✖".red().bold(),
                err
            );
        }
        if let Some(rest) = every.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}

fn attempt_backup(cfg: &Settings, runner: &dyn CommandRunner) -> Result<Outcome> {
    let notifier = Notifier::from_settings(cfg);
    match backup_once(cfg, runner) {
        Ok(outcome) => {
            if cfg.notify_on_success {
                notifier.send("packrat backup succeeded", "backup completed");
            }
            Ok(outcome)
        }
        Err(err) => {
            notifier.send("packrat backup failed", &format!("{err:#}"));
            Err(err)
        }
    }
}

fn backup_once(cfg: &Settings, runner: &dyn CommandRunner) -> Result<Outcome> {
    // 1) Make sure the tracked directory exists before anything writes into it.
    fs::create_dir_all(&cfg.target_dir)
        .with_context(|| format!("creating target directory {}", cfg.target_dir.display()))?;

    // 2) Dump the database into the tracked tree so the snapshot carries it.
    //    A dump failure aborts here: a snapshot must never be taken without
    //    an up-to-date dump when a database is configured.
    if let Some(pg) = &cfg.postgres {
        let store = RelationalStore::new(runner, pg);
        let name = select::dump_file_name(&cfg.dump_prefix, Utc::now());
        let bar = spinner("Dumping database");
        store
            .dump(&cfg.target_dir.join(&name))
            .context("database dump failed")?;
        bar.finish_with_message(format!("Dump written: {}", name));
    }

    // 3) Snapshot the whole directory, dump included.
    let store = SnapshotStore::new(runner, &cfg.repo);
    store
        .ensure_repository()
        .context("repository check failed")?;
    let bar = spinner("Creating snapshot");
    store
        .backup(&cfg.target_dir)
        .context("snapshot creation failed")?;
    bar.finish_with_message("Snapshot created");

    println!("{} {}", "✔".green().bold(), "Backup complete".green());
    Ok(Outcome::Success)
}

fn restore_once(
    cfg: &Settings,
    runner: &dyn CommandRunner,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Outcome> {
    // 1) Independent gates: each target is only restored into when empty.
    let restore_files = probe::is_dir_empty(&cfg.target_dir)?;
    if !restore_files {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!(
                "{} is not empty, leaving files in place",
                cfg.target_dir.display()
            )
            .yellow()
        );
    }
    let restore_db = match &cfg.postgres {
        Some(pg) => {
            let store = RelationalStore::new(runner, pg);
            let empty = probe::is_database_empty(&store);
            if !empty {
                println!(
                    "{} {}",
                    "i".yellow().bold(),
                    format!("database '{}' is not empty, leaving it alone", pg.database).yellow()
                );
            }
            empty
        }
        None => false,
    };
    if !restore_files && !restore_db {
        return Ok(Outcome::Skipped(
            "nothing to restore into: every target is already populated".into(),
        ));
    }

    // 2) The file tree comes back from the snapshot store; the database gate
    //    alone consumes whatever dump the directory already holds.
    let mut restored_files = false;
    if restore_files {
        let store = SnapshotStore::new(runner, &cfg.repo);
        let snapshots = store.list().context("snapshot listing failed")?;
        let Some(snapshot) = select::select_snapshot(&snapshots, cutoff) else {
            return Ok(Outcome::Skipped(match cutoff {
                Some(c) => format!("no snapshot taken at or before {}", c.to_rfc3339()),
                None => "the repository holds no snapshots".into(),
            }));
        };
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!(
                "Restoring snapshot {} from {}",
                snapshot.id,
                snapshot.time.to_rfc3339()
            )
            .yellow()
        );

        // 3) The snapshot goes back to the absolute path it was captured
        //    from, which is why backup and restore must share a target.
        let bar = spinner("Restoring files");
        store
            .restore(&snapshot.id)
            .context("file restore failed")?;
        bar.finish_with_message("Files restored");
        restored_files = true;
    }

    // 4) Load the newest dump artifact found at the top level, if any.
    if let Some(pg) = cfg.postgres.as_ref().filter(|_| restore_db) {
        let entries = dump_entries(&cfg.target_dir)?;
        match select::select_dump(&entries, &cfg.dump_prefix) {
            Some(dump) => {
                let store = RelationalStore::new(runner, pg);
                let bar = spinner("Restoring database");
                store
                    .restore(&cfg.target_dir.join(&dump.name))
                    .context("database restore failed")?;
                bar.finish_with_message(format!("Database restored from {}", dump.name));
            }
            None if restored_files => {
                println!(
                    "{} {}",
                    "i".yellow().bold(),
                    "snapshot carries no dump artifact, files-only restore".yellow()
                );
            }
            None => {
                return Ok(Outcome::Skipped(
                    "database is empty but no dump artifact is present".into(),
                ));
            }
        }
    }

    println!("{} {}", "✔".green().bold(), "Restore complete".green());
    Ok(Outcome::Success)
}

/// Fail fast (exit 127) when a required external tool is absent, before any
/// step runs. A nonzero version probe is fine; only a failed spawn matters.
fn preflight(cfg: &Settings, runner: &dyn CommandRunner) -> Result<()> {
    runner.run("restic", &["version"], &[])?;
    if cfg.postgres.is_some() {
        for tool in ["pg_dump", "pg_restore", "psql"] {
            runner.run(tool, &["--version"], &[])?;
        }
    }
    Ok(())
}

/// Top-level listing of the target directory as dump candidates. The search
/// is deliberately non-recursive: the artifact contract is one dump at the
/// top of the tracked tree.
fn dump_entries(dir: &Path) -> Result<Vec<DumpEntry>> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        entries.push(DumpEntry { name, modified });
    }
    Ok(entries)
}

pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn spinner(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}
