use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

use crate::drivers::postgres::RelationalStore;

/// True when the path does not exist or the directory holds zero entries.
/// `read_dir` yields dotfiles too, so a directory containing only hidden
/// entries counts as non-empty.
pub fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let mut entries =
        fs::read_dir(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(entries.next().is_none())
}

/// True when the database holds no user-visible relations, or when it cannot
/// be reached at all. An unreachable database counts as empty on purpose: a
/// not-yet-created database must not block restore. The cost is that a
/// transient connection failure looks the same, so the fallback is logged.
pub fn is_database_empty(store: &RelationalStore) -> bool {
    match store.relation_count() {
        Ok(count) => count == 0,
        Err(err) => {
            eprintln!(
                "{} {}: {}",
                "!".yellow().bold(),
                "Warning".yellow(),
                format!("database unreachable, treating it as empty: {err:#}")
            );
            true
        }
    }
}
