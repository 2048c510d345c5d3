//! Timezone-aware 5-field cron evaluation (minute hour dom month dow).
//!
//! Expressions are matched against local wall-clock time in an IANA
//! zone, then converted to UTC for scheduling.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Parse a timezone string into a `chrono_tz::Tz`, falling back to UTC.
pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// True if the expression fires every minute (first field `*`).
pub fn runs_every_minute(expr: &str) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    fields.len() == 5 && fields[0] == "*"
}

/// Normalize an expression to single-space separated fields.
pub fn normalize_expr(expr: &str) -> String {
    expr.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Field matching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a 5-field cron expression (field count, token shapes, ranges).
pub fn validate_expr(expr: &str) -> Result<(), String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "cron expr must be 5-field: minute hour day month weekday (got {})",
            fields.len()
        ));
    }
    let names = ["minute", "hour", "day-of-month", "month", "day-of-week"];
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];
    for (i, field) in fields.iter().enumerate() {
        validate_field(field, names[i], ranges[i].0, ranges[i].1)?;
    }
    Ok(())
}

fn validate_field(field: &str, name: &str, min: u32, max: u32) -> Result<(), String> {
    if field == "*" {
        return Ok(());
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step
            .parse()
            .map_err(|_| format!("{name}: invalid step '*/{step}'"))?;
        if n == 0 || n > max {
            return Err(format!("{name}: step {n} out of range 1..={max}"));
        }
        return Ok(());
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            let start: u32 = start_s
                .parse()
                .map_err(|_| format!("{name}: invalid range start '{start_s}'"))?;
            let end: u32 = end_s
                .parse()
                .map_err(|_| format!("{name}: invalid range end '{end_s}'"))?;
            if start < min || start > max || end < min || end > max {
                return Err(format!("{name}: range {start}-{end} out of bounds {min}..={max}"));
            }
            if start > end {
                return Err(format!("{name}: range start {start} > end {end}"));
            }
        } else {
            let n: u32 = part
                .parse()
                .map_err(|_| format!("{name}: invalid value '{part}'"))?;
            if n < min || n > max {
                return Err(format!("{name}: value {n} out of range {min}..={max}"));
            }
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Next occurrence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn matches_naive(expr: &str, dt: &chrono::NaiveDateTime) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    field_matches(fields[0], dt.minute())
        && field_matches(fields[1], dt.hour())
        && field_matches(fields[2], dt.day())
        && field_matches(fields[3], dt.month())
        && field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Next occurrence after `after`, evaluated in `tz`, returned in UTC.
///
/// DST handling: local times inside a spring-forward gap are skipped;
/// fall-back overlaps resolve to the earliest (pre-transition) mapping.
pub fn next_occurrence(
    expr: &str,
    after: &DateTime<Utc>,
    tz: chrono_tz::Tz,
) -> Option<DateTime<Utc>> {
    use chrono::TimeZone;

    let local_after = after.with_timezone(&tz).naive_local();
    let to_next_minute = 60 - i64::from(local_after.second());
    let mut candidate = local_after + chrono::Duration::seconds(to_next_minute);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60; // one year of minutes
    for _ in 0..max_checks {
        if matches_naive(expr, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    return Some(earliest.with_timezone(&Utc));
                }
                chrono::LocalResult::None => {
                    // DST gap — this local minute does not exist.
                }
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validate_accepts_common_expressions() {
        assert!(validate_expr("0 * * * *").is_ok());
        assert!(validate_expr("*/5 9-17 * * 1-5").is_ok());
        assert!(validate_expr("30 9 1,15 * *").is_ok());
        assert!(validate_expr("0 0 * * 0").is_ok());
    }

    #[test]
    fn validate_rejects_bad_expressions() {
        assert!(validate_expr("* * *").is_err());
        assert!(validate_expr("* * * * * *").is_err());
        assert!(validate_expr("60 * * * *").is_err());
        assert!(validate_expr("* 24 * * *").is_err());
        assert!(validate_expr("* * 0 * *").is_err());
        assert!(validate_expr("* * * 13 *").is_err());
        assert!(validate_expr("* * * * 7").is_err());
        assert!(validate_expr("*/0 * * * *").is_err());
        assert!(validate_expr("abc * * * *").is_err());
    }

    #[test]
    fn every_minute_detection() {
        assert!(runs_every_minute("* * * * *"));
        assert!(runs_every_minute("*  *  *  *  *"));
        assert!(!runs_every_minute("*/5 * * * *"));
        assert!(!runs_every_minute("0 * * * *"));
        assert!(!runs_every_minute("* * *"));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_expr("  *   *  * * *"), "* * * * *");
    }

    #[test]
    fn next_occurrence_half_hour() {
        let after = Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap();
        let next = next_occurrence("30 * * * *", &after, chrono_tz::UTC).unwrap();
        assert_eq!(next.minute(), 30);
        assert_eq!(next.hour(), 10);
    }

    #[test]
    fn next_occurrence_skips_current_minute() {
        // "after" is exactly on a match; the next one is an hour later.
        let after = Utc.with_ymd_and_hms(2026, 6, 15, 10, 0, 0).unwrap();
        let next = next_occurrence("0 * * * *", &after, chrono_tz::UTC).unwrap();
        assert_eq!(next.hour(), 11);
    }

    #[test]
    fn next_occurrence_respects_timezone() {
        // "0 9 * * *" in US/Eastern after 12:00 UTC (8:00 EDT):
        // next local 9:00 EDT is 13:00 UTC.
        let after = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();
        let next = next_occurrence("0 9 * * *", &after, parse_tz("US/Eastern")).unwrap();
        assert_eq!(next.hour(), 13);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn next_occurrence_spring_forward_gap_is_skipped() {
        // US/Eastern springs forward on 2026-03-08, 2:00 -> 3:00 AM.
        // 2:30 AM local does not exist that day; next hit is March 9.
        let after = Utc.with_ymd_and_hms(2026, 3, 8, 6, 0, 0).unwrap();
        let next = next_occurrence("30 2 * * *", &after, parse_tz("US/Eastern")).unwrap();
        assert_eq!(next.day(), 9);
        assert_eq!(next.hour(), 6);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn next_occurrence_fall_back_prefers_earliest() {
        // US/Eastern falls back on 2026-11-01, 2:00 -> 1:00 AM.
        // 1:30 AM local is ambiguous; the earliest mapping (EDT, UTC-4)
        // is 5:30 UTC.
        let after = Utc.with_ymd_and_hms(2026, 11, 1, 4, 0, 0).unwrap();
        let next = next_occurrence("30 1 * * *", &after, parse_tz("US/Eastern")).unwrap();
        assert_eq!(next.hour(), 5);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn parse_tz_fallback_to_utc() {
        assert_eq!(parse_tz("Not/Real"), chrono_tz::UTC);
        assert_eq!(parse_tz(""), chrono_tz::UTC);
        assert_eq!(parse_tz("Europe/Amsterdam"), chrono_tz::Europe::Amsterdam);
    }

    #[test]
    fn comma_and_range_fields_match() {
        let dt = Utc.with_ymd_and_hms(2026, 6, 15, 10, 15, 0).unwrap();
        assert!(matches_naive("0,15,30,45 * * * *", &dt.naive_utc()));
        assert!(matches_naive("* 9-17 * * *", &dt.naive_utc()));
        assert!(!matches_naive("0,30 * * * *", &dt.naive_utc()));
    }
}
