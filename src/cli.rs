use clap::{Parser, Subcommand};

/// packrat: snapshot-based backup and restore for a directory tree and its database
#[derive(Parser, Debug)]
#[command(name = "packrat", version, about = "Back up a directory tree (and an optional PostgreSQL database) into a restic repository, and restore it back.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump the database (if configured) and snapshot the target directory
    Backup {
        /// Re-run the backup on a fixed interval (e.g. "15m", "12h") instead of once
        #[arg(long, value_name = "INTERVAL")]
        schedule: Option<String>,
    },

    /// Restore the newest snapshot, then the dump artifact it carries
    Restore {
        /// Upper bound on snapshot time: YYYY-MM-DD or a full RFC3339 instant
        #[arg(long, value_name = "DATE")]
        before: Option<String>,
    },
}
