//! Run directory naming.
//!
//! `<YYYY-MM-DDTHH:MM:SS.mmm>_<sanitized-branch>_<7-hex-commit>` is the only
//! key discovery trusts. The timestamp is local wall-clock time.

use std::fmt::Display;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeZone};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Number of hex characters of the commit hash embedded in directory names.
pub const SHORT_HASH_LEN: usize = 7;

static RUN_DIR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3})_(.+)_([a-f0-9]{7})$").unwrap()
});

/// Components recovered from a run directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirName {
    pub timestamp: NaiveDateTime,
    pub branch: String,
    pub short_hash: String,
}

/// Replace path separators so a branch name is usable as one path component.
pub fn sanitize_branch(branch: &str) -> String {
    branch.replace(['/', '\\'], "-")
}

/// Leading [`SHORT_HASH_LEN`] characters of a commit hash.
pub fn short_hash(full_hash: &str) -> &str {
    full_hash.get(..SHORT_HASH_LEN).unwrap_or(full_hash)
}

pub fn run_dir_name<Tz>(start: &DateTime<Tz>, branch: &str, short_hash: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{}_{}_{}",
        start.format(TIMESTAMP_FORMAT),
        sanitize_branch(branch),
        short_hash
    )
}

/// Parse a directory name; `None` means the directory is not a run.
pub fn parse_run_dir_name(name: &str) -> Option<RunDirName> {
    let caps = RUN_DIR_RE.captures(name)?;
    let timestamp = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
    Some(RunDirName {
        timestamp,
        branch: caps[2].to_string(),
        short_hash: caps[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn sanitize_replaces_separators_only() {
        assert_eq!(sanitize_branch("foo/bar"), "foo-bar");
        assert_eq!(sanitize_branch("feature/a/b"), "feature-a-b");
        assert_eq!(sanitize_branch("main"), "main");
        assert_eq!(sanitize_branch("fix-1_x.y"), "fix-1_x.y");
    }

    #[test]
    fn builds_name_with_millis_and_short_hash() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let start = tz
            .with_ymd_and_hms(2025, 3, 4, 5, 6, 7)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(89))
            .unwrap();
        let name = run_dir_name(&start, "feat/x", short_hash("0123456789abcdef"));
        assert_eq!(name, "2025-03-04T05:06:07.089_feat-x_0123456");
    }

    #[test]
    fn built_names_parse_back() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let start = tz.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let parsed = parse_run_dir_name(&run_dir_name(&start, "main", "abcdef0")).unwrap();
        assert_eq!(
            parsed,
            RunDirName {
                timestamp: NaiveDate::from_ymd_opt(2024, 12, 31)
                    .unwrap()
                    .and_hms_opt(23, 59, 59)
                    .unwrap(),
                branch: "main".to_string(),
                short_hash: "abcdef0".to_string(),
            }
        );
    }

    #[test]
    fn rejects_foreign_directory_names() {
        assert!(parse_run_dir_name("archives").is_none());
        assert!(parse_run_dir_name("2025-01-01T00:00:00_main_abcdef0").is_none());
        assert!(parse_run_dir_name("2025-01-01T00:00:00.000_main_ABCDEF0").is_none());
        assert!(parse_run_dir_name("2025-01-01T00:00:00.000_main_abcdef").is_none());
    }

    #[test]
    fn branch_may_contain_underscores() {
        let parsed = parse_run_dir_name("2025-01-01T00:00:00.000_my_branch_abcdef0").unwrap();
        assert_eq!(parsed.branch, "my_branch");
    }
}
