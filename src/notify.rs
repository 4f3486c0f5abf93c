use anyhow::{Result, anyhow};
use colored::*;
use std::time::Duration;

use crate::config::settings::{NotifySettings, Settings};

/// Best-effort notification sink. Does nothing when no endpoint is
/// configured; a delivery failure is reported as a warning and never changes
/// the run's outcome or exit code.
pub struct Notifier<'a> {
    target: Option<&'a NotifySettings>,
}

impl<'a> Notifier<'a> {
    pub fn from_settings(cfg: &'a Settings) -> Self {
        Self {
            target: cfg.notify.as_ref(),
        }
    }

    pub fn send(&self, title: &str, message: &str) {
        let Some(target) = self.target else {
            return;
        };
        if let Err(err) = post(target, title, message) {
            eprintln!(
                "{} {}: {}",
                "!".yellow().bold(),
                "Warning".yellow(),
                format!("notification not delivered: {err:#}")
            );
        }
    }
}

fn post(target: &NotifySettings, title: &str, message: &str) -> Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mut request = client
        .post(&target.url)
        .header("Title", title)
        .body(message.to_string());
    if let Some(token) = &target.token {
        request = request.bearer_auth(token);
    }
    let response = request.send()?;
    if !response.status().is_success() {
        return Err(anyhow!("endpoint returned {}", response.status()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{LogLevel, RepoSettings};
    use std::path::PathBuf;

    #[test]
    fn disabled_notifier_is_a_no_op() {
        let cfg = Settings {
            target_dir: PathBuf::from("/srv/data"),
            repo: RepoSettings {
                repository: "r".into(),
                password: "p".into(),
                host: None,
                tags: Vec::new(),
            },
            postgres: None,
            dump_prefix: "pgdump".into(),
            notify: None,
            notify_on_success: false,
            log: LogLevel::Info,
        };
        // Must not attempt any network traffic.
        Notifier::from_settings(&cfg).send("backup failed", "boom");
    }
}
