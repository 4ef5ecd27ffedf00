use std::{cmp::Ordering, fmt};

use chrono::{DateTime, NaiveDateTime, Utc};

pub const SNAPSHOT_PREFIX: &str = "snapshot";
pub const SNAPSHOT_EXTENSION: &str = "bks";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parsed form of a persisted snapshot name: `snapshot_YYYYMMDD_HHMMSS[_N].bks` (UTC).
///
/// `N` starts at 2 and only appears when an earlier snapshot already took the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotName {
    pub created_at: DateTime<Utc>,
    pub sequence: u32,
}

impl SnapshotName {
    pub fn new(created_at: DateTime<Utc>, sequence: u32) -> Self {
        Self {
            created_at,
            sequence: sequence.max(1),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let stem = name
            .strip_suffix(SNAPSHOT_EXTENSION)?
            .strip_suffix('.')?
            .strip_prefix(SNAPSHOT_PREFIX)?
            .strip_prefix('_')?;
        let segments: Vec<&str> = stem.split('_').collect();
        let (date, time, sequence) = match segments.as_slice() {
            [date, time] => (*date, *time, 1),
            [date, time, seq] => {
                let sequence: u32 = seq.parse().ok().filter(|n| *n >= 2)?;
                if seq.starts_with('0') {
                    return None;
                }
                (*date, *time, sequence)
            }
            _ => return None,
        };
        if !is_digits(date, 8) || !is_digits(time, 6) {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            created_at: DateTime::from_naive_utc_and_offset(naive, Utc),
            sequence,
        })
    }

    /// Newest-first ordering: later timestamps first, then higher collision suffixes.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then(b.sequence.cmp(&a.sequence))
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            SNAPSHOT_PREFIX,
            self.created_at.format(TIMESTAMP_FORMAT)
        )?;
        if self.sequence > 1 {
            write!(f, "_{}", self.sequence)?;
        }
        write!(f, ".{}", SNAPSHOT_EXTENSION)
    }
}

/// Newest-first comparison of raw names; names that do not parse go last in lexical order.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    match (SnapshotName::parse(a), SnapshotName::parse(b)) {
        (Some(x), Some(y)) => SnapshotName::newest_first(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

pub fn sort_newest_first(names: &mut [String]) {
    names.sort_by(|a, b| compare_names(a, b));
}

/// Rejects anything that could escape a backend's namespace.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, s).single().expect("valid time")
    }

    #[test]
    fn formats_human_sortable_names() {
        assert_eq!(
            SnapshotName::new(at(14, 25, 30), 1).to_string(),
            "snapshot_20261019_142530.bks"
        );
        assert_eq!(
            SnapshotName::new(at(14, 25, 30), 3).to_string(),
            "snapshot_20261019_142530_3.bks"
        );
    }

    #[test]
    fn parse_accepts_what_display_produces() {
        let name = SnapshotName::new(at(9, 0, 1), 12);
        assert_eq!(SnapshotName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for bad in [
            "snapshot_20261019.bks",
            "snapshot_20261019_142530.json",
            "backup_20261019_142530.bks",
            "snapshot_20261399_142530.bks",
            "snapshot_20261019_142530_1.bks",
            "snapshot_20261019_142530_02.bks",
            "snapshot_20261019_142530_x.bks",
        ] {
            assert_eq!(SnapshotName::parse(bad), None, "{bad} should not parse");
        }
    }

    #[test]
    fn sort_orders_newest_first_with_suffixes() {
        let mut names = vec![
            "snapshot_20261019_142530.bks".to_string(),
            "notes.txt".to_string(),
            "snapshot_20261019_142530_10.bks".to_string(),
            "snapshot_20261020_000000.bks".to_string(),
            "snapshot_20261019_142530_9.bks".to_string(),
        ];
        sort_newest_first(&mut names);
        assert_eq!(
            names,
            vec![
                "snapshot_20261020_000000.bks",
                "snapshot_20261019_142530_10.bks",
                "snapshot_20261019_142530_9.bks",
                "snapshot_20261019_142530.bks",
                "notes.txt",
            ]
        );
    }

    #[test]
    fn unsafe_names_are_flagged() {
        assert!(is_safe_name("snapshot_20261019_142530.bks"));
        assert!(!is_safe_name("../records.db"));
        assert!(!is_safe_name("a/b.bks"));
        assert!(!is_safe_name(".hidden.tmp"));
        assert!(!is_safe_name(""));
    }
}
