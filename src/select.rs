use chrono::{DateTime, NaiveDate, Utc};

use crate::config::settings::ConfigError;

/// One entry from the snapshot store's listing. `time` is normalized to UTC
/// at the store boundary, so comparisons here are plain typed ordering and
/// never depend on string formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub time: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// A dump artifact candidate found at the top level of the target directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
}

/// Parse a `--before` cutoff. A bare date means the end of that UTC day, so
/// "restore as of 2024-01-01" includes every snapshot taken on that date.
/// Full RFC3339 instants are accepted and normalized to UTC.
pub fn parse_cutoff(text: &str) -> Result<DateTime<Utc>, ConfigError> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let end_of_day = date.and_hms_opt(23, 59, 59).unwrap();
        return Ok(end_of_day.and_utc());
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    Err(ConfigError::Invalid {
        key: "--before".into(),
        reason: format!("'{}' is neither YYYY-MM-DD nor an RFC3339 instant", text),
    })
}

/// Pick the snapshot to restore: the newest one, or with a cutoff the newest
/// at or before it. Ties on time break on id, so repeated calls over the
/// same listing always agree.
pub fn select_snapshot<'a>(
    snapshots: &'a [Snapshot],
    cutoff: Option<DateTime<Utc>>,
) -> Option<&'a Snapshot> {
    snapshots
        .iter()
        .filter(|s| cutoff.is_none_or(|c| s.time <= c))
        .max_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)))
}

/// Timestamped dump artifact name. Old dumps accumulate in the tracked tree
/// until pruned out-of-band; in exchange every snapshot carries the dump
/// that was taken for it.
pub fn dump_file_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}.dump", prefix, now.format("%Y%m%dT%H%M%SZ"))
}

fn is_dump_name(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|rest| rest.ends_with(".dump"))
}

/// Pick the dump artifact to load: the newest `<prefix>-*.dump` among the
/// given top-level entries, ties on modification time broken by name.
pub fn select_dump<'a>(entries: &'a [DumpEntry], prefix: &str) -> Option<&'a DumpEntry> {
    entries
        .iter()
        .filter(|e| is_dump_name(&e.name, prefix))
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snap(id: &str, time: &str) -> Snapshot {
        Snapshot {
            id: id.into(),
            time: ts(time),
            tags: Vec::new(),
        }
    }

    #[test]
    fn empty_listing_selects_nothing() {
        assert_eq!(select_snapshot(&[], None), None);
        assert_eq!(select_snapshot(&[], Some(ts("2024-01-01T00:00:00Z"))), None);
    }

    #[test]
    fn no_cutoff_selects_newest() {
        let snaps = [
            snap("a1", "2024-01-01T00:00:00Z"),
            snap("b2", "2024-03-01T00:00:00Z"),
            snap("c3", "2024-02-01T00:00:00Z"),
        ];
        assert_eq!(select_snapshot(&snaps, None).unwrap().id, "b2");
    }

    #[test]
    fn cutoff_filters_newer_snapshots() {
        let snaps = [
            snap("a1", "2024-01-01T00:00:00Z"),
            snap("b2", "2024-03-01T00:00:00Z"),
        ];
        let chosen = select_snapshot(&snaps, Some(ts("2024-02-15T00:00:00Z"))).unwrap();
        assert_eq!(chosen.id, "a1");
    }

    #[test]
    fn cutoff_is_inclusive() {
        let snaps = [snap("a1", "2024-01-01T00:00:00Z")];
        let chosen = select_snapshot(&snaps, Some(ts("2024-01-01T00:00:00Z")));
        assert_eq!(chosen.unwrap().id, "a1");
    }

    #[test]
    fn cutoff_before_everything_selects_nothing() {
        let snaps = [snap("a1", "2024-01-01T00:00:00Z")];
        assert_eq!(
            select_snapshot(&snaps, Some(ts("2023-12-31T23:59:59Z"))),
            None
        );
    }

    #[test]
    fn equal_times_break_on_id_deterministically() {
        let snaps = [
            snap("aaa", "2024-01-01T00:00:00Z"),
            snap("zzz", "2024-01-01T00:00:00Z"),
        ];
        let first = select_snapshot(&snaps, None).unwrap().id.clone();
        let second = select_snapshot(&snaps, None).unwrap().id.clone();
        assert_eq!(first, "zzz");
        assert_eq!(first, second);
    }

    #[test]
    fn bare_date_cutoff_covers_the_whole_day() {
        assert_eq!(
            parse_cutoff("2023-12-31").unwrap(),
            ts("2023-12-31T23:59:59Z")
        );
    }

    #[test]
    fn full_instant_cutoff_is_normalized_to_utc() {
        assert_eq!(
            parse_cutoff("2024-01-01T12:00:00+02:00").unwrap(),
            ts("2024-01-01T10:00:00Z")
        );
    }

    #[test]
    fn malformed_cutoff_is_rejected() {
        assert!(parse_cutoff("yesterday").is_err());
        assert!(parse_cutoff("2024-13-01").is_err());
    }

    #[test]
    fn dump_file_names_embed_the_instant() {
        assert_eq!(
            dump_file_name("pgdump", ts("2024-01-01T00:00:00Z")),
            "pgdump-20240101T000000Z.dump"
        );
    }

    #[test]
    fn newest_dump_wins() {
        let entries = [
            DumpEntry {
                name: "pgdump-20240101T000000Z.dump".into(),
                modified: ts("2024-01-01T00:00:00Z"),
            },
            DumpEntry {
                name: "pgdump-20240301T000000Z.dump".into(),
                modified: ts("2024-03-01T00:00:00Z"),
            },
        ];
        assert_eq!(
            select_dump(&entries, "pgdump").unwrap().name,
            "pgdump-20240301T000000Z.dump"
        );
    }

    #[test]
    fn foreign_files_are_ignored() {
        let entries = [
            DumpEntry {
                name: "app.log".into(),
                modified: ts("2024-06-01T00:00:00Z"),
            },
            DumpEntry {
                name: "otherprefix-20240101T000000Z.dump".into(),
                modified: ts("2024-06-01T00:00:00Z"),
            },
            DumpEntry {
                name: "pgdump-20240101T000000Z.dump".into(),
                modified: ts("2024-01-01T00:00:00Z"),
            },
        ];
        assert_eq!(
            select_dump(&entries, "pgdump").unwrap().name,
            "pgdump-20240101T000000Z.dump"
        );
    }

    #[test]
    fn no_matching_dump_selects_nothing() {
        assert_eq!(select_dump(&[], "pgdump"), None);
        let entries = [DumpEntry {
            name: "notes.txt".into(),
            modified: ts("2024-01-01T00:00:00Z"),
        }];
        assert_eq!(select_dump(&entries, "pgdump"), None);
    }

    #[test]
    fn equal_mtimes_break_on_name() {
        let entries = [
            DumpEntry {
                name: "pgdump-20240101T000000Z.dump".into(),
                modified: ts("2024-01-01T00:00:00Z"),
            },
            DumpEntry {
                name: "pgdump-20240101T000001Z.dump".into(),
                modified: ts("2024-01-01T00:00:00Z"),
            },
        ];
        assert_eq!(
            select_dump(&entries, "pgdump").unwrap().name,
            "pgdump-20240101T000001Z.dump"
        );
    }
}
