use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::config::SignalThresholds;

/// Parse a timestamp into UTC. Accepts RFC 3339, naive date-times (read as
/// UTC) and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    parse_date_time(value).or_else(|| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(start_of_day)
    })
}

/// Parse a calendar date. Full timestamps are truncated to their UTC date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_time(value).map(|ts| ts.date_naive()))
}

/// Date-time shapes only; never falls back to a bare date.
fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    // Postgres text output, e.g. `2026-02-10 12:00:00.5+00`.
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|parsed| Utc.from_utc_datetime(&parsed))
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// UTC calendar day a timestamp falls on.
pub fn day_key(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Whole days elapsed from `then` to `now`, rounded down.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_milliseconds().div_euclid(Duration::days(1).num_milliseconds())
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Window boundaries derived from a single `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub now: DateTime<Utc>,
    /// Start of the long scan window used to fetch session logs.
    pub long_start: DateTime<Utc>,
    /// Start of the recent comparison window.
    pub recent_start: DateTime<Utc>,
    /// Start of the previous comparison window; it ends at `recent_start`.
    pub previous_start: DateTime<Utc>,
}

impl Windows {
    pub fn new(now: DateTime<Utc>, thresholds: &SignalThresholds) -> Self {
        let recent = Duration::days(thresholds.recent_window_days);
        Self {
            now,
            long_start: now - Duration::days(thresholds.long_window_days),
            recent_start: now - recent,
            previous_start: now - recent - recent,
        }
    }

    pub fn is_recent(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.recent_start && ts <= self.now
    }

    pub fn is_previous(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.previous_start && ts < self.recent_start
    }
}

/// ISO-8601 with millisecond precision, the format collaborators receive.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
