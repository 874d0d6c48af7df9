use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Numeric knobs of the signal builders. The defaults are the tuned
/// production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignalThresholds {
    pub long_window_days: i64,
    pub recent_window_days: i64,

    pub attendance_min_logs: usize,
    pub attendance_max_recent_avg: f64,
    pub attendance_min_drop: f64,
    pub attendance_high_drop: f64,
    pub attendance_high_below_avg: f64,

    pub absence_min_streak: usize,
    pub absence_high_streak: usize,
    pub absence_max_age_days: i64,

    pub report_delay_days: i64,
    pub report_delay_high_days: i64,

    pub presence_min_days: usize,
    pub presence_min_median: f64,
    pub presence_high_ratio: f64,
    pub presence_medium_ratio: f64,

    pub engagement_drop_count: usize,
    pub engagement_absence_count: usize,
    pub engagement_report_delay_count: usize,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            long_window_days: 42,
            recent_window_days: 14,

            attendance_min_logs: 4,
            attendance_max_recent_avg: 0.72,
            attendance_min_drop: 0.10,
            attendance_high_drop: 0.15,
            attendance_high_below_avg: 0.65,

            absence_min_streak: 3,
            absence_high_streak: 4,
            absence_max_age_days: 30,

            report_delay_days: 7,
            report_delay_high_days: 14,

            presence_min_days: 3,
            presence_min_median: 6.0,
            presence_high_ratio: 0.4,
            presence_medium_ratio: 0.6,

            engagement_drop_count: 2,
            engagement_absence_count: 5,
            engagement_report_delay_count: 3,
        }
    }
}

impl SignalThresholds {
    /// Load overrides from a JSON file. Fields left out keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read thresholds from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid thresholds file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub thresholds: SignalThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_millis(60_000),
            thresholds: SignalThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_overrides_keep_defaults() {
        let parsed: SignalThresholds =
            serde_json::from_str(r#"{"reportDelayDays": 5, "presenceMinMedian": 4}"#).unwrap();
        assert_eq!(parsed.report_delay_days, 5);
        assert_eq!(parsed.presence_min_median, 4.0);
        assert_eq!(parsed.report_delay_high_days, 14);
        assert_eq!(parsed.recent_window_days, 14);
    }

    #[test]
    fn default_ttl_is_one_minute() {
        assert_eq!(EngineConfig::default().cache_ttl, Duration::from_secs(60));
    }
}
