use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .keys.join(", "))]
    Missing { keys: Vec<String> },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

/// restic repository coordinates plus the labels stamped on every snapshot.
#[derive(Debug, Clone)]
pub struct RepoSettings {
    pub repository: String,
    pub password: String,
    pub host: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub url: String,
    pub token: Option<String>,
}

/// Immutable run configuration, read from the environment exactly once at
/// startup. Validation reports every missing key in a single error rather
/// than one at a time.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_dir: PathBuf,
    pub repo: RepoSettings,
    pub postgres: Option<PgSettings>,
    pub dump_prefix: String,
    pub notify: Option<NotifySettings>,
    pub notify_on_success: bool,
    pub log: LogLevel,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing: Vec<String> = Vec::new();
        let mut require = |key: &str| match get(key) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                missing.push(key.to_string());
                None
            }
        };

        let target_dir = require("PACKRAT_TARGET_DIR");
        let repository = require("PACKRAT_REPOSITORY");
        let repo_password = require("PACKRAT_REPOSITORY_PASSWORD");

        // The PostgreSQL block is all-or-nothing: one key present makes the
        // rest of the group required.
        let pg_host = get("PACKRAT_PG_HOST");
        let pg_database = get("PACKRAT_PG_DATABASE");
        let pg_user = get("PACKRAT_PG_USER");
        let pg_password = get("PACKRAT_PG_PASSWORD");
        let pg_wanted = [&pg_host, &pg_database, &pg_user, &pg_password]
            .iter()
            .any(|v| v.is_some());
        if pg_wanted {
            for (key, value) in [
                ("PACKRAT_PG_HOST", &pg_host),
                ("PACKRAT_PG_DATABASE", &pg_database),
                ("PACKRAT_PG_USER", &pg_user),
                ("PACKRAT_PG_PASSWORD", &pg_password),
            ] {
                if value.is_none() {
                    missing.push(key.to_string());
                }
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing { keys: missing });
        }

        let port = match get("PACKRAT_PG_PORT") {
            Some(v) => v.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PACKRAT_PG_PORT".into(),
                reason: format!("'{}' is not a port number", v),
            })?,
            None => 5432,
        };

        let postgres = if pg_wanted {
            Some(PgSettings {
                host: pg_host.unwrap(),
                port,
                database: pg_database.unwrap(),
                user: pg_user.unwrap(),
                password: pg_password.unwrap(),
            })
        } else {
            None
        };

        let log = match get("PACKRAT_LOG").as_deref() {
            None | Some("info") => LogLevel::Info,
            Some("debug") => LogLevel::Debug,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PACKRAT_LOG".into(),
                    reason: format!("'{}' is not one of: info, debug", other),
                });
            }
        };

        let tags = get("PACKRAT_TAGS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let notify = get("PACKRAT_NOTIFY_URL").map(|url| NotifySettings {
            url,
            token: get("PACKRAT_NOTIFY_TOKEN"),
        });

        let notify_on_success = get("PACKRAT_NOTIFY_ON_SUCCESS")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Settings {
            target_dir: PathBuf::from(target_dir.unwrap()),
            repo: RepoSettings {
                repository: repository.unwrap(),
                password: repo_password.unwrap(),
                host: get("PACKRAT_HOST"),
                tags,
            },
            postgres,
            dump_prefix: get("PACKRAT_DUMP_PREFIX").unwrap_or_else(|| "pgdump".into()),
            notify,
            notify_on_success,
            log,
        })
    }
}
