//! Signal builders.
//!
//! Phase one runs four independent builders, each over its own slice of raw
//! data. Phase two reduces the phase-one output into the organization-wide
//! engagement-risk signal. Builders are pure and never fail: malformed rows
//! are skipped and counted.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SignalThresholds;
use crate::models::{
    AttendanceRecord, CheckinRecord, ClassRecord, PendingReportRecord, SessionLogRecord, Severity,
    Signal, SignalType, StudentRecord, ABSENT_STATUS,
};
use crate::window::{self, Windows};

/// Shared inputs for every builder of one run.
pub struct BuildContext<'a> {
    pub organization_id: &'a str,
    pub windows: Windows,
    pub thresholds: &'a SignalThresholds,
    pub classes_by_id: HashMap<&'a str, &'a ClassRecord>,
    pub students_by_id: HashMap<&'a str, &'a StudentRecord>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        organization_id: &'a str,
        windows: Windows,
        thresholds: &'a SignalThresholds,
        classes: &'a [ClassRecord],
        students: &'a [StudentRecord],
    ) -> Self {
        Self {
            organization_id,
            windows,
            thresholds,
            classes_by_id: classes.iter().map(|c| (c.id.as_str(), c)).collect(),
            students_by_id: students.iter().map(|s| (s.id.as_str(), s)).collect(),
        }
    }

    fn class_label(&self, class_id: &str) -> String {
        self.classes_by_id
            .get(class_id)
            .map(|c| c.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(class_id)
            .to_string()
    }

    fn student_label(&self, student_id: &str) -> String {
        self.students_by_id
            .get(student_id)
            .map(|s| s.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(student_id)
            .to_string()
    }
}

/// Output of phase one, one list per independent builder.
#[derive(Debug, Default, Clone)]
pub struct PhaseOneSignals {
    pub attendance_drop: Vec<Signal>,
    pub repeated_absence: Vec<Signal>,
    pub report_delay: Vec<Signal>,
    pub unusual_presence: Vec<Signal>,
}

impl PhaseOneSignals {
    pub fn into_vec(self) -> Vec<Signal> {
        let mut all = self.attendance_drop;
        all.extend(self.repeated_absence);
        all.extend(self.report_delay);
        all.extend(self.unusual_presence);
        all
    }
}

pub fn build_phase_one(
    ctx: &BuildContext<'_>,
    session_logs: &[SessionLogRecord],
    attendance: &[AttendanceRecord],
    pending_reports: &[PendingReportRecord],
    checkins: &[CheckinRecord],
) -> PhaseOneSignals {
    PhaseOneSignals {
        attendance_drop: build_attendance_drop(ctx, session_logs),
        repeated_absence: build_repeated_absence(ctx, attendance),
        report_delay: build_report_delay(ctx, pending_reports),
        unusual_presence: build_unusual_presence(ctx, checkins),
    }
}

/// Class whose recent average attendance fell into a low regime compared with
/// the previous window.
pub fn build_attendance_drop(ctx: &BuildContext<'_>, logs: &[SessionLogRecord]) -> Vec<Signal> {
    let t = ctx.thresholds;
    let mut by_class: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    let mut skipped = 0usize;

    for log in logs {
        let class_id = log.class_id.trim();
        let ts = window::parse_timestamp(&log.created_at);
        match ts {
            Some(ts) if !class_id.is_empty() && log.attendance.is_finite() => {
                by_class.entry(class_id).or_default().push((ts, log.attendance));
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "attendance_drop: ignored malformed session logs");
    }

    let mut signals = Vec::new();
    for (class_id, rows) in by_class {
        if rows.len() < t.attendance_min_logs {
            continue;
        }

        let recent: Vec<f64> = rows
            .iter()
            .filter(|(ts, _)| ctx.windows.is_recent(*ts))
            .map(|(_, value)| *value)
            .collect();
        let previous: Vec<f64> = rows
            .iter()
            .filter(|(ts, _)| ctx.windows.is_previous(*ts))
            .map(|(_, value)| *value)
            .collect();

        let (Some(avg_recent), Some(avg_previous)) = (window::mean(&recent), window::mean(&previous))
        else {
            continue;
        };

        // Compare on the same rounded values the evidence reports.
        let avg_recent = window::round3(avg_recent);
        let avg_previous = window::round3(avg_previous);
        let drop = window::round3(avg_previous - avg_recent);

        if avg_recent > t.attendance_max_recent_avg || drop < t.attendance_min_drop {
            continue;
        }

        let severity = if drop >= t.attendance_high_drop || avg_recent < t.attendance_high_below_avg {
            Severity::High
        } else {
            Severity::Medium
        };

        let Some(detected_at) = rows.iter().map(|(ts, _)| *ts).max() else {
            continue;
        };
        let class_name = ctx.class_label(class_id);

        signals.push(
            Signal::builder(
                SignalType::AttendanceDrop,
                ctx.organization_id,
                Some(class_id.to_string()),
                None,
            )
            .finish(
                severity,
                format!("Attendance drop in {class_name}"),
                format!(
                    "Average attendance fell from {:.0}% to {:.0}% over the last {} days.",
                    avg_previous * 100.0,
                    avg_recent * 100.0,
                    t.recent_window_days
                ),
                json!({
                    "avgRecent": avg_recent,
                    "avgPrevious": avg_previous,
                    "drop": drop,
                    "recentSamples": recent.len(),
                    "previousSamples": previous.len(),
                }),
                detected_at,
            ),
        );
    }

    debug!(count = signals.len(), "attendance_drop built");
    signals
}

struct AttendanceRow<'a> {
    date: NaiveDate,
    created_at: Option<DateTime<Utc>>,
    record: &'a AttendanceRecord,
}

/// Student whose most recent attendance rows are a run of absences.
pub fn build_repeated_absence(ctx: &BuildContext<'_>, rows: &[AttendanceRecord]) -> Vec<Signal> {
    let t = ctx.thresholds;
    let today = ctx.windows.now.date_naive();
    let mut by_student: BTreeMap<&str, Vec<AttendanceRow<'_>>> = BTreeMap::new();
    let mut skipped = 0usize;

    for record in rows {
        let student_id = record.student_id.trim();
        match window::parse_date(&record.date) {
            Some(date) if !student_id.is_empty() => {
                by_student.entry(student_id).or_default().push(AttendanceRow {
                    date,
                    created_at: record.created_at.as_deref().and_then(window::parse_timestamp),
                    record,
                });
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "repeated_absence: ignored malformed attendance rows");
    }

    let min_streak = t.absence_min_streak.max(1);
    let mut signals = Vec::new();
    for (student_id, mut history) in by_student {
        history.sort_by(|a, b| (b.date, b.created_at).cmp(&(a.date, a.created_at)));

        let streak = history
            .iter()
            .take_while(|row| row.record.status == ABSENT_STATUS)
            .count();
        if streak < min_streak {
            continue;
        }

        // A streak whose qualifying absence is old is stale.
        let qualifying = history[min_streak - 1].date;
        if (today - qualifying).num_days() > t.absence_max_age_days {
            continue;
        }

        let latest = history[0].date;
        let earliest = history[streak - 1].date;
        let severity = if streak >= t.absence_high_streak {
            Severity::High
        } else {
            Severity::Medium
        };

        let class_id = history[0]
            .record
            .class_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| {
                ctx.students_by_id
                    .get(student_id)
                    .and_then(|s| s.class_id.clone())
                    .filter(|id| !id.trim().is_empty())
            });

        let student_name = ctx.student_label(student_id);
        let summary = match class_id.as_deref() {
            Some(class_id) => format!(
                "{student_name} missed the last {streak} sessions of {} (since {earliest}).",
                ctx.class_label(class_id)
            ),
            None => format!("{student_name} missed the last {streak} sessions (since {earliest})."),
        };

        signals.push(
            Signal::builder(
                SignalType::RepeatedAbsence,
                ctx.organization_id,
                class_id,
                Some(student_id.to_string()),
            )
            .finish(
                severity,
                format!("{student_name} has {streak} absences in a row"),
                summary,
                json!({
                    "streak": streak,
                    "latestAbsenceDate": latest.to_string(),
                    "earliestAbsenceDate": earliest.to_string(),
                    "qualifyingAbsenceDate": qualifying.to_string(),
                }),
                window::start_of_day(latest),
            ),
        );
    }

    debug!(count = signals.len(), "repeated_absence built");
    signals
}

/// Class that has gone too long without a session report, or never had one.
pub fn build_report_delay(ctx: &BuildContext<'_>, pending: &[PendingReportRecord]) -> Vec<Signal> {
    let t = ctx.thresholds;
    let now = ctx.windows.now;
    let mut skipped = 0usize;
    let mut signals = Vec::new();

    for row in pending {
        let class_id = row.class_id.trim();
        if class_id.is_empty() {
            skipped += 1;
            continue;
        }

        let last_report_at = match row.last_report_at.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match window::parse_timestamp(raw) {
                Some(ts) => Some(ts),
                None => {
                    skipped += 1;
                    continue;
                }
            },
        };

        let days_without_report = last_report_at.map(|ts| window::days_since(ts, now));
        let severity = match days_without_report {
            None => Severity::High,
            Some(days) if days >= t.report_delay_high_days => Severity::High,
            Some(days) if days >= t.report_delay_days => Severity::Medium,
            Some(_) => continue,
        };

        let class_name = row
            .class_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| ctx.class_label(class_id));

        let summary = match days_without_report {
            Some(days) => format!("{class_name} has not had a session report for {days} days."),
            None => format!("{class_name} has no session report on record."),
        };

        signals.push(
            Signal::builder(
                SignalType::ReportDelay,
                ctx.organization_id,
                Some(class_id.to_string()),
                None,
            )
            .finish(
                severity,
                format!("Session reports overdue for {class_name}"),
                summary,
                json!({
                    "daysWithoutReport": days_without_report,
                    "hasHistory": last_report_at.is_some(),
                    "lastReportAt": last_report_at.map(window::to_iso),
                    "periodStart": row.period_start,
                    "unit": row.unit,
                }),
                last_report_at.unwrap_or(now),
            ),
        );
    }

    if skipped > 0 {
        warn!(skipped, "report_delay: ignored malformed pending report rows");
    }
    debug!(count = signals.len(), "report_delay built");
    signals
}

/// Class whose latest day of NFC check-ins is far below its usual daily count.
pub fn build_unusual_presence(ctx: &BuildContext<'_>, checkins: &[CheckinRecord]) -> Vec<Signal> {
    let t = ctx.thresholds;
    let mut daily: BTreeMap<&str, BTreeMap<NaiveDate, usize>> = BTreeMap::new();
    let mut skipped = 0usize;

    for checkin in checkins {
        let class_id = checkin.class_id.trim();
        match window::parse_timestamp(&checkin.checked_in_at) {
            Some(ts) if !class_id.is_empty() => {
                if ctx.windows.is_recent(ts) {
                    *daily
                        .entry(class_id)
                        .or_default()
                        .entry(window::day_key(ts))
                        .or_default() += 1;
                }
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "unusual_presence_pattern: ignored malformed check-ins");
    }

    let mut signals = Vec::new();
    for (class_id, days) in daily {
        if days.len() < t.presence_min_days {
            continue;
        }
        let Some((&latest_day, &latest_count)) = days.iter().next_back() else {
            continue;
        };

        let history: Vec<f64> = days
            .iter()
            .filter(|(day, _)| **day != latest_day)
            .map(|(_, count)| *count as f64)
            .collect();
        let Some(median) = window::median(&history) else {
            continue;
        };
        if median < t.presence_min_median {
            continue;
        }

        let latest = latest_count as f64;
        let severity = if latest <= median * t.presence_high_ratio {
            Severity::High
        } else if latest <= median * t.presence_medium_ratio {
            Severity::Medium
        } else {
            continue;
        };

        let class_name = ctx.class_label(class_id);
        let median = window::round3(median);

        signals.push(
            Signal::builder(
                SignalType::UnusualPresencePattern,
                ctx.organization_id,
                Some(class_id.to_string()),
                None,
            )
            .finish(
                severity,
                format!("Unusual check-in pattern in {class_name}"),
                format!(
                    "Only {latest_count} check-ins on {latest_day}, against a typical {median} per day."
                ),
                json!({
                    "latestDate": latest_day.to_string(),
                    "latestCount": latest_count,
                    "median": median,
                    "sampleDays": days.len(),
                }),
                window::start_of_day(latest_day),
            ),
        );
    }

    debug!(count = signals.len(), "unusual_presence_pattern built");
    signals
}

/// Organization-wide signal raised when several phase-one patterns pile up.
/// Reads only the phase-one output.
pub fn build_engagement_risk(
    ctx: &BuildContext<'_>,
    phase_one: &PhaseOneSignals,
) -> Option<Signal> {
    let t = ctx.thresholds;

    let attendance_drop_count = phase_one
        .attendance_drop
        .iter()
        .filter(|s| matches!(s.severity, Severity::High | Severity::Medium))
        .count();
    let repeated_absence_count = phase_one.repeated_absence.len();
    let report_delay_count = phase_one.report_delay.len();

    let conditions = [
        attendance_drop_count >= t.engagement_drop_count,
        repeated_absence_count >= t.engagement_absence_count,
        attendance_drop_count >= 1 && report_delay_count >= t.engagement_report_delay_count,
    ];
    let conditions_met = conditions.iter().filter(|met| **met).count();
    if conditions_met == 0 {
        return None;
    }

    let severity = if conditions_met >= 2 {
        Severity::Critical
    } else {
        Severity::High
    };

    debug!(conditions_met, "engagement_risk built");
    Some(
        Signal::builder(SignalType::EngagementRisk, ctx.organization_id, None, None).finish(
            severity,
            "Engagement risk across the organization".to_string(),
            format!(
                "{attendance_drop_count} classes with attendance drops, {repeated_absence_count} students with repeated absences and {report_delay_count} classes with overdue reports."
            ),
            json!({
                "attendanceDropCount": attendance_drop_count,
                "repeatedAbsenceCount": repeated_absence_count,
                "reportDelayCount": report_delay_count,
                "conditionsMet": conditions_met,
            }),
            ctx.windows.now,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORG: &str = "org_1";
    const NOW: &str = "2026-02-20T12:00:00.000Z";

    fn now() -> DateTime<Utc> {
        window::parse_timestamp(NOW).unwrap()
    }

    fn days_ago(days: i64) -> String {
        window::to_iso(now() - chrono::Duration::days(days))
    }

    fn date_days_ago(days: i64) -> String {
        (now() - chrono::Duration::days(days)).date_naive().to_string()
    }

    fn with_ctx<R>(f: impl FnOnce(&BuildContext<'_>) -> R) -> R {
        let thresholds = SignalThresholds::default();
        let classes = vec![
            ClassRecord { id: "c_1".into(), name: "Sub-13 Morning".into() },
            ClassRecord { id: "c_2".into(), name: "Sub-15 Evening".into() },
        ];
        let students = vec![StudentRecord {
            id: "s_1".into(),
            name: "Ana Costa".into(),
            class_id: Some("c_1".into()),
        }];
        let ctx = BuildContext::new(
            ORG,
            Windows::new(now(), &thresholds),
            &thresholds,
            &classes,
            &students,
        );
        f(&ctx)
    }

    fn log(class_id: &str, attendance: f64, days: i64) -> SessionLogRecord {
        SessionLogRecord {
            class_id: class_id.into(),
            attendance,
            created_at: days_ago(days),
        }
    }

    fn attendance(student_id: &str, status: &str, days: i64) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.into(),
            class_id: Some("c_1".into()),
            status: status.into(),
            date: date_days_ago(days),
            created_at: Some(days_ago(days)),
        }
    }

    #[test]
    fn attendance_drop_flags_steep_decline_as_high() {
        let logs = vec![
            log("c_1", 0.62, 2),
            log("c_1", 0.58, 6),
            log("c_1", 0.9, 17),
            log("c_1", 0.86, 22),
        ];
        let signals = with_ctx(|ctx| build_attendance_drop(ctx, &logs));
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.signal_type, SignalType::AttendanceDrop);
        assert_eq!(signal.severity, Severity::High);
        assert_eq!(signal.class_id.as_deref(), Some("c_1"));
        assert_eq!(signal.id, "attendance_drop:org_1:c_1:none");
        assert_eq!(signal.detected_at, now() - chrono::Duration::days(2));
        assert_eq!(signal.evidence["avgRecent"], 0.6);
        assert_eq!(signal.evidence["avgPrevious"], 0.88);
        assert_eq!(signal.evidence["recentSamples"], 2);
        assert!(signal.title.contains("Sub-13 Morning"));
    }

    #[test]
    fn attendance_drop_boundary_is_inclusive() {
        let at_limit = vec![
            log("c_1", 0.72, 1),
            log("c_1", 0.72, 3),
            log("c_1", 0.82, 16),
            log("c_1", 0.82, 20),
        ];
        let signals = with_ctx(|ctx| build_attendance_drop(ctx, &at_limit));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::Medium);

        let above_limit = vec![
            log("c_1", 0.73, 1),
            log("c_1", 0.73, 3),
            log("c_1", 0.83, 16),
            log("c_1", 0.83, 20),
        ];
        assert!(with_ctx(|ctx| build_attendance_drop(ctx, &above_limit)).is_empty());
    }

    #[test]
    fn attendance_drop_needs_both_windows_and_enough_rows() {
        let only_recent = vec![
            log("c_1", 0.4, 1),
            log("c_1", 0.4, 2),
            log("c_1", 0.4, 3),
            log("c_1", 0.4, 4),
        ];
        assert!(with_ctx(|ctx| build_attendance_drop(ctx, &only_recent)).is_empty());

        let too_few = vec![log("c_1", 0.4, 1), log("c_1", 0.4, 2), log("c_1", 0.9, 20)];
        assert!(with_ctx(|ctx| build_attendance_drop(ctx, &too_few)).is_empty());
    }

    #[test]
    fn attendance_drop_ignores_malformed_rows() {
        let logs = vec![
            log("c_1", 0.6, 2),
            log("c_1", f64::NAN, 3),
            SessionLogRecord {
                class_id: "c_1".into(),
                attendance: 0.1,
                created_at: "not a date".into(),
            },
            log("c_1", 0.9, 18),
        ];
        assert!(with_ctx(|ctx| build_attendance_drop(ctx, &logs)).is_empty());
    }

    #[test]
    fn two_absences_are_not_a_streak() {
        let rows = vec![
            attendance("s_1", "faltou", 1),
            attendance("s_1", "faltou", 3),
            attendance("s_1", "presente", 5),
            attendance("s_1", "faltou", 7),
        ];
        assert!(with_ctx(|ctx| build_repeated_absence(ctx, &rows)).is_empty());
    }

    #[test]
    fn three_absences_are_medium_and_four_are_high() {
        let three = vec![
            attendance("s_1", "faltou", 1),
            attendance("s_1", "faltou", 3),
            attendance("s_1", "faltou", 5),
            attendance("s_1", "presente", 7),
        ];
        let signals = with_ctx(|ctx| build_repeated_absence(ctx, &three));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].severity, Severity::Medium);

        let four = vec![
            attendance("s_1", "faltou", 1),
            attendance("s_1", "faltou", 3),
            attendance("s_1", "faltou", 5),
            attendance("s_1", "faltou", 8),
        ];
        let signals = with_ctx(|ctx| build_repeated_absence(ctx, &four));
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.severity, Severity::High);
        assert_eq!(signal.student_id.as_deref(), Some("s_1"));
        assert_eq!(signal.class_id.as_deref(), Some("c_1"));
        assert_eq!(signal.id, "repeated_absence:org_1:c_1:s_1");
        assert_eq!(signal.evidence["streak"], 4);
        assert_eq!(
            signal.detected_at,
            window::start_of_day((now() - chrono::Duration::days(1)).date_naive())
        );
    }

    #[test]
    fn stale_streak_is_skipped() {
        let rows = vec![
            attendance("s_1", "faltou", 20),
            attendance("s_1", "faltou", 26),
            attendance("s_1", "faltou", 35),
        ];
        assert!(with_ctx(|ctx| build_repeated_absence(ctx, &rows)).is_empty());
    }

    #[test]
    fn streak_order_uses_created_at_within_a_day() {
        let mut present_later = attendance("s_1", "presente", 1);
        present_later.created_at = Some(window::to_iso(now() - chrono::Duration::hours(20)));
        let mut absent_earlier = attendance("s_1", "faltou", 1);
        absent_earlier.created_at = Some(window::to_iso(now() - chrono::Duration::hours(30)));
        let rows = vec![
            absent_earlier,
            present_later,
            attendance("s_1", "faltou", 3),
            attendance("s_1", "faltou", 5),
        ];
        assert!(with_ctx(|ctx| build_repeated_absence(ctx, &rows)).is_empty());
    }

    fn pending(class_id: &str, last_report_at: Option<String>) -> PendingReportRecord {
        PendingReportRecord {
            class_id: class_id.into(),
            class_name: None,
            unit: Some("North".into()),
            period_start: Some(date_days_ago(5)),
            last_report_at,
        }
    }

    #[test]
    fn report_delay_severity_split() {
        let rows = vec![
            pending("c_1", Some(days_ago(9))),
            pending("c_2", Some(days_ago(14))),
            pending("c_3", None),
            pending("c_4", Some(days_ago(3))),
        ];
        let signals = with_ctx(|ctx| build_report_delay(ctx, &rows));
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].severity, Severity::Medium);
        assert_eq!(signals[0].evidence["daysWithoutReport"], 9);
        assert_eq!(signals[0].title, "Session reports overdue for Sub-13 Morning");
        assert_eq!(signals[1].severity, Severity::High);
        assert_eq!(signals[2].severity, Severity::High);
        assert_eq!(signals[2].detected_at, now());
        assert_eq!(signals[2].evidence["hasHistory"], false);
        assert!(signals[2].evidence["daysWithoutReport"].is_null());
    }

    #[test]
    fn report_delay_skips_unparseable_last_report() {
        let rows = vec![pending("c_1", Some("someday".into()))];
        assert!(with_ctx(|ctx| build_report_delay(ctx, &rows)).is_empty());
    }

    fn checkins(class_id: &str, per_day: &[(i64, usize)]) -> Vec<CheckinRecord> {
        per_day
            .iter()
            .flat_map(|(days, count)| {
                (0..*count).map(move |i| CheckinRecord {
                    class_id: class_id.into(),
                    checked_in_at: window::to_iso(
                        now() - chrono::Duration::days(*days) + chrono::Duration::minutes(i as i64),
                    ),
                })
            })
            .collect()
    }

    #[test]
    fn unusual_presence_flags_collapsed_latest_day() {
        let rows = checkins("c_1", &[(3, 6), (2, 6), (1, 2)]);
        assert_eq!(rows.len(), 14);
        let signals = with_ctx(|ctx| build_unusual_presence(ctx, &rows));
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.severity, Severity::High);
        assert_eq!(signal.evidence["latestCount"], 2);
        assert_eq!(signal.evidence["median"], 6.0);
        assert_eq!(signal.evidence["sampleDays"], 3);
        assert_eq!(
            signal.detected_at,
            window::start_of_day((now() - chrono::Duration::days(1)).date_naive())
        );
    }

    #[test]
    fn unusual_presence_medium_and_quiet_cases() {
        let medium = checkins("c_1", &[(3, 10), (2, 10), (1, 5)]);
        let signals = with_ctx(|ctx| build_unusual_presence(ctx, &medium));
        assert_eq!(signals[0].severity, Severity::Medium);

        let normal = checkins("c_1", &[(3, 10), (2, 10), (1, 8)]);
        assert!(with_ctx(|ctx| build_unusual_presence(ctx, &normal)).is_empty());

        let small_class = checkins("c_1", &[(3, 4), (2, 4), (1, 0)]);
        assert!(with_ctx(|ctx| build_unusual_presence(ctx, &small_class)).is_empty());

        let two_days = checkins("c_1", &[(2, 10), (1, 1)]);
        assert!(with_ctx(|ctx| build_unusual_presence(ctx, &two_days)).is_empty());
    }

    #[test]
    fn long_malformed_timestamps_are_skipped() {
        let mut rows = checkins("c_1", &[(3, 6), (2, 6), (1, 2)]);
        rows.push(CheckinRecord {
            class_id: "c_1".into(),
            checked_in_at: "2026-02-19 garbage".into(),
        });
        let signals = with_ctx(|ctx| build_unusual_presence(ctx, &rows));
        assert_eq!(signals.len(), 1);

        let absences = vec![AttendanceRecord {
            student_id: "s_1".into(),
            class_id: Some("c_1".into()),
            status: "faltou".into(),
            date: "sometime last week".into(),
            created_at: Some("2026-02-19 late evening".into()),
        }];
        assert!(with_ctx(|ctx| build_repeated_absence(ctx, &absences)).is_empty());

        let pending_rows = vec![pending("c_1", Some("2026-02-01 or so".into()))];
        assert!(with_ctx(|ctx| build_report_delay(ctx, &pending_rows)).is_empty());
    }

    fn phase_one_with(drops: usize, absences: usize, delays: usize) -> PhaseOneSignals {
        let make = |signal_type, class_id: String, student_id: Option<String>| {
            Signal::builder(signal_type, ORG, Some(class_id), student_id).finish(
                Severity::Medium,
                String::new(),
                String::new(),
                json!({}),
                now(),
            )
        };
        PhaseOneSignals {
            attendance_drop: (0..drops)
                .map(|i| make(SignalType::AttendanceDrop, format!("c_{i}"), None))
                .collect(),
            repeated_absence: (0..absences)
                .map(|i| make(SignalType::RepeatedAbsence, "c_1".into(), Some(format!("s_{i}"))))
                .collect(),
            report_delay: (0..delays)
                .map(|i| make(SignalType::ReportDelay, format!("c_{i}"), None))
                .collect(),
            unusual_presence: Vec::new(),
        }
    }

    #[test]
    fn engagement_risk_gating() {
        assert!(with_ctx(|ctx| build_engagement_risk(ctx, &phase_one_with(1, 4, 2))).is_none());

        let single = with_ctx(|ctx| build_engagement_risk(ctx, &phase_one_with(0, 5, 3))).unwrap();
        assert_eq!(single.severity, Severity::High);
        assert_eq!(single.evidence["conditionsMet"], 1);

        let double = with_ctx(|ctx| build_engagement_risk(ctx, &phase_one_with(2, 0, 3))).unwrap();
        assert_eq!(double.severity, Severity::Critical);
        assert_eq!(double.evidence["conditionsMet"], 2);
        assert_eq!(double.id, "engagement_risk:org_1:none:none");
        assert!(double.class_id.is_none() && double.student_id.is_none());
        assert_eq!(double.detected_at, now());
    }

    #[test]
    fn engagement_risk_ignores_low_attendance_drops() {
        let mut phase_one = phase_one_with(2, 0, 0);
        for signal in &mut phase_one.attendance_drop {
            signal.severity = Severity::Low;
        }
        assert!(with_ctx(|ctx| build_engagement_risk(ctx, &phase_one)).is_none());
    }
}
