//! Week and version keys
//!
//! A snapshot's "week" is either an ISO calendar week (`2026W03`) or a
//! sanitized upstream timestamp (`2026-01-05T03-22-48+00-00`). Both are used
//! verbatim as file stems and manifest entries, and both order correctly
//! under plain string comparison as long as calendar weeks stay zero-padded.

use crate::error::{RepoCacheError, RepoCacheResult};
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

/// Directory name used when a snapshot has no repository
pub const GLOBAL_REPO: &str = "_global_";

/// ISO week id for the current UTC time
pub fn current_week() -> String {
    week_of(Utc::now())
}

/// ISO week id (`YYYYWww`, zero-padded) for a timestamp
pub fn week_of(ts: DateTime<Utc>) -> String {
    let iso = ts.iso_week();
    format!("{}W{:02}", iso.year(), iso.week())
}

/// Zero-pad unpadded calendar week ids (`2026W9` -> `2026W09`).
///
/// Anything that is not a calendar week id is returned unchanged.
pub fn normalize_week(week: &str) -> String {
    if let Some((year, num)) = week.split_once('W') {
        let is_year = year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit());
        let is_num = (1..=2).contains(&num.len()) && num.bytes().all(|b| b.is_ascii_digit());
        if is_year && is_num {
            return format!("{}W{:0>2}", year, num);
        }
    }
    week.to_string()
}

/// Parse an upstream `pushed_at` value.
///
/// Accepts RFC 3339 (`Z` or numeric offsets). Timestamps without an offset
/// are taken as UTC.
pub fn parse_pushed_at(raw: &str) -> RepoCacheResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| RepoCacheError::InvalidTimestamp(raw.to_string()))
}

/// Filesystem-safe version key for an upstream timestamp.
///
/// The instant is normalized to UTC with sub-second precision dropped, so the
/// same push always maps to the same key.
pub fn sanitize_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S+00:00")
        .to_string()
        .replace(':', "-")
}

/// Version key straight from a raw `pushed_at` string
pub fn version_key(pushed_at: &str) -> RepoCacheResult<String> {
    parse_pushed_at(pushed_at).map(sanitize_timestamp)
}

const RESERVED: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Reject an owner or repository name that would not map to a directory of
/// its own. Names that sanitize to the same component would share files.
pub fn check_component(name: &str) -> RepoCacheResult<()> {
    let reason = if name.is_empty() || name == "." || name == ".." {
        "not a usable directory name"
    } else if name.contains(RESERVED) {
        "contains a path separator or reserved character"
    } else {
        return Ok(());
    };
    Err(RepoCacheError::InvalidKey {
        value: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Make a name safe to use as a single path component
pub fn sanitize_component(name: &str) -> String {
    if name.is_empty() || name == "." || name == ".." {
        return "_".to_string();
    }
    name.chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_is_zero_padded() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).unwrap();
        assert_eq!(week_of(ts), "2026W09");
    }

    #[test]
    fn week_uses_iso_year() {
        // Jan 1st 2027 is a Friday, so it belongs to 2026's last ISO week
        let ts = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(week_of(ts), "2026W53");
    }

    #[test]
    fn normalize_pads_calendar_weeks_only() {
        assert_eq!(normalize_week("2026W9"), "2026W09");
        assert_eq!(normalize_week("2026W10"), "2026W10");
        assert_eq!(
            normalize_week("2026-01-05T03-22-48+00-00"),
            "2026-01-05T03-22-48+00-00"
        );
        assert_eq!(normalize_week("list_True"), "list_True");
    }

    #[test]
    fn padded_weeks_sort_as_strings() {
        let mut weeks = vec![normalize_week("2026W9"), normalize_week("2026W10")];
        weeks.sort();
        assert_eq!(weeks, vec!["2026W09", "2026W10"]);
    }

    #[test]
    fn sanitize_drops_subseconds_and_colons() {
        let ts = parse_pushed_at("2026-01-05T03:22:48.123456+00:00").unwrap();
        assert_eq!(sanitize_timestamp(ts), "2026-01-05T03-22-48+00-00");
    }

    #[test]
    fn sanitize_normalizes_offsets() {
        let zulu = version_key("2026-01-05T03:22:48Z").unwrap();
        let shifted = version_key("2026-01-05T05:22:48+02:00").unwrap();
        let naive = version_key("2026-01-05T03:22:48").unwrap();
        assert_eq!(zulu, shifted);
        assert_eq!(zulu, naive);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_pushed_at("yesterday"),
            Err(RepoCacheError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn sanitize_component_replaces_separators() {
        assert_eq!(sanitize_component("simple"), "simple");
        assert_eq!(sanitize_component("a/b"), "a_b");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component(""), "_");
    }

    #[test]
    fn check_component_rejects_colliding_names() {
        assert!(check_component("parser").is_ok());
        assert!(check_component("a_b").is_ok());
        for bad in ["a:b", "a/b", "", "..", "x|y"] {
            assert!(
                matches!(check_component(bad), Err(RepoCacheError::InvalidKey { .. })),
                "{:?}",
                bad
            );
        }
    }
}
