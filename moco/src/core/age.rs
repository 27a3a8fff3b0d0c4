//! Age specs (`7d`, `12h`, `30m`) and human-readable durations.

use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};

use crate::core::error::MocoError;

static AGE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(\d+)([dhm])$").unwrap());

const AGE_EXPECTED: &str = "<number><d|h|m>, e.g. 30d";

/// Parse `<N>d`, `<N>h` or `<N>m` into a span.
pub fn parse_age(spec: &str) -> Result<TimeDelta, MocoError> {
    let invalid = || MocoError::config("age", spec, AGE_EXPECTED);
    let caps = AGE_RE.captures(spec.trim()).ok_or_else(invalid)?;
    let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
    let span = match &caps[2] {
        "d" => TimeDelta::try_days(amount),
        "h" => TimeDelta::try_hours(amount),
        _ => TimeDelta::try_minutes(amount),
    };
    span.ok_or_else(invalid)
}

/// Instant `spec` before `now`. An absent or empty spec means no cutoff.
pub fn cutoff_from(now: DateTime<Utc>, spec: Option<&str>) -> Result<Option<DateTime<Utc>>, MocoError> {
    match spec.map(str::trim) {
        None | Some("") => Ok(None),
        Some(spec) => {
            let age = parse_age(spec)?;
            now.checked_sub_signed(age)
                .map(Some)
                .ok_or_else(|| MocoError::config("age", spec, AGE_EXPECTED))
        }
    }
}

/// Render a span rounded to whole seconds: `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(span: TimeDelta) -> String {
    let millis = span.num_milliseconds().max(0);
    let total = (millis + 500) / 1000;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_age("7d").unwrap(), TimeDelta::days(7));
        assert_eq!(parse_age("12h").unwrap(), TimeDelta::hours(12));
        assert_eq!(parse_age("30m").unwrap(), TimeDelta::minutes(30));
    }

    #[test]
    fn rejects_malformed_specs() {
        for spec in ["", "7", "d7", "7w", "-1d", "1.5h", "7 d"] {
            let err = parse_age(spec).unwrap_err();
            assert!(matches!(err, MocoError::Config { what: "age", .. }), "{spec}");
        }
    }

    #[test]
    fn cutoff_is_optional() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(cutoff_from(now, None).unwrap(), None);
        assert_eq!(cutoff_from(now, Some("")).unwrap(), None);
        assert_eq!(
            cutoff_from(now, Some("1d")).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 5, 31, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn formats_durations_by_magnitude() {
        assert_eq!(format_duration(TimeDelta::milliseconds(1_004)), "1s");
        assert_eq!(format_duration(TimeDelta::milliseconds(1_500)), "2s");
        assert_eq!(format_duration(TimeDelta::seconds(125)), "2m 5s");
        assert_eq!(format_duration(TimeDelta::seconds(3_723)), "1h 2m 3s");
        assert_eq!(format_duration(TimeDelta::seconds(3_600)), "1h 0m 0s");
        assert_eq!(format_duration(TimeDelta::zero()), "0s");
    }
}
