pub mod config;
mod cli;
mod drivers;
mod exec;
mod notify;
mod ops;
mod probe;
mod select;

use anyhow::Result;
use clap::Parser;
use colored::*;

use cli::{Cli, Commands};
use config::settings::{ConfigError, LogLevel, Settings};
use exec::{ExecError, SystemRunner};
use ops::Outcome;

fn main() {
    if let Err(err) = run() {
        eprintln!(
            "{} {} {:#}",
            ops::timestamp().dimmed(),
            "✖".red().bold(),
            err
        );
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<Outcome> {
    let cli = Cli::parse();
    let cfg = Settings::from_env()?;
    let runner = SystemRunner {
        verbose: cfg.log == LogLevel::Debug,
    };

    match cli.command {
        Commands::Backup { schedule: None } => ops::do_backup(&cfg, &runner),
        Commands::Backup {
            schedule: Some(every),
        } => ops::do_schedule(&cfg, &runner, &every),
        Commands::Restore { before } => ops::do_restore(&cfg, &runner, before.as_deref()),
    }
}

/// 2 for configuration/usage problems, 127 for a missing external tool,
/// 1 for any step failure. Skips exit 0 through the Ok path.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    for cause in err.chain() {
        if matches!(cause.downcast_ref::<ExecError>(), Some(ExecError::Missing(_))) {
            return 127;
        }
    }
    1
}
