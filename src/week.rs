//! # Week Module
//!
//! ISO week bucketing for budget accounting. Keys look like `2025-W07`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

static WEEK_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").unwrap());

pub const WEEK_SECONDS: i64 = 7 * 24 * 60 * 60;

/// ISO week key (`YYYY-W##`) for a timestamp. Uses the ISO year, so the last
/// days of December can belong to week 1 of the following year.
pub fn iso_week_key(ts: DateTime<Utc>) -> String {
    let w = ts.iso_week();
    format!("{}-W{:02}", w.year(), w.week())
}

pub fn parse_week_key(key: &str) -> Option<(i32, u32)> {
    let caps = WEEK_KEY_RE.captures(key.trim())?;
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let week = caps.get(2)?.as_str().parse::<u32>().ok()?;
    // Rejects week 53 in years that only have 52
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    Some((year, week))
}

/// Monday 00:00 UTC (inclusive) to the following Monday (exclusive)
pub fn week_bounds(year: i32, week: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0)?);
    Some((start, start + Duration::days(7)))
}

pub fn current_week_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let w = now.iso_week();
    week_bounds(w.year(), w.week()).unwrap_or((now, now + Duration::days(7)))
}

/// Fraction of the current ISO week that has elapsed, in (0, 1]
pub fn week_elapsed_fraction(now: DateTime<Utc>) -> f64 {
    let (start, _) = current_week_bounds(now);
    let elapsed = (now - start).num_seconds().max(1) as f64;
    (elapsed / WEEK_SECONDS as f64).clamp(f64::MIN_POSITIVE, 1.0)
}

/// The last `n` week keys ending with the week containing `now`, newest first
pub fn previous_weeks(now: DateTime<Utc>, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| iso_week_key(now - Duration::weeks(i as i64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_week_key_uses_iso_year() {
        assert_eq!(iso_week_key(utc(2024, 12, 30)), "2025-W01");
        assert_eq!(iso_week_key(utc(2021, 1, 3)), "2020-W53");
        assert_eq!(iso_week_key(utc(2025, 2, 12)), "2025-W07");
    }

    #[test]
    fn test_parse_week_key() {
        assert_eq!(parse_week_key("2025-W07"), Some((2025, 7)));
        assert_eq!(parse_week_key("2020-W53"), Some((2020, 53)));
        assert_eq!(parse_week_key("2025-W53"), None);
        assert_eq!(parse_week_key("2025-7"), None);
    }

    #[test]
    fn test_week_bounds_start_monday() {
        let (start, end) = week_bounds(2025, 7).unwrap();
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
        assert_eq!((end - start).num_days(), 7);
    }

    #[test]
    fn test_elapsed_fraction() {
        // Thursday noon is 3.5 days into the week
        let f = week_elapsed_fraction(utc(2025, 2, 13));
        assert!((f - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_previous_weeks() {
        let weeks = previous_weeks(utc(2025, 1, 8), 3);
        assert_eq!(weeks, vec!["2025-W02", "2025-W01", "2024-W52"]);
    }
}
