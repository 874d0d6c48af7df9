use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attendance status recorded for an absent student.
pub const ABSENT_STATUS: &str = "faltou";

/// Sentinel used in signal ids when a scoping key is not set.
pub const NO_SCOPE_KEY: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    #[serde(default)]
    pub class_id: Option<String>,
    pub status: String,
    /// Calendar date of the session, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLogRecord {
    pub class_id: String,
    /// Attendance fraction in `0..=1`. Non-finite values are ignored.
    pub attendance: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReportRecord {
    pub class_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub period_start: Option<String>,
    #[serde(default)]
    pub last_report_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinRecord {
    pub class_id: String,
    pub checked_in_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    AttendanceDrop,
    RepeatedAbsence,
    ReportDelay,
    UnusualPresencePattern,
    EngagementRisk,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::AttendanceDrop => "attendance_drop",
            SignalType::RepeatedAbsence => "repeated_absence",
            SignalType::ReportDelay => "report_delay",
            SignalType::UnusualPresencePattern => "unusual_presence_pattern",
            SignalType::EngagementRisk => "engagement_risk",
        }
    }

    /// Action catalog ids offered for this signal type, in display order.
    pub fn recommended_action_ids(&self) -> &'static [&'static str] {
        match self {
            SignalType::AttendanceDrop => &["review_class_attendance", "plan_engagement_session"],
            SignalType::RepeatedAbsence => &["contact_student_guardian", "open_student_history"],
            SignalType::ReportDelay => &["open_pending_reports", "remind_coach_report"],
            SignalType::UnusualPresencePattern => &["review_nfc_checkins", "verify_nfc_reader"],
            SignalType::EngagementRisk => &[
                "open_organization_overview",
                "plan_engagement_session",
                "open_pending_reports",
            ],
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk level. Variant order is the ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalScope {
    Organization,
    Class,
    Student,
}

/// One detected risk condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub severity: Severity,
    pub scope: SignalScope,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub title: String,
    pub summary: String,
    pub evidence: serde_json::Value,
    pub recommended_action_ids: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl Signal {
    /// Identity key: `type:organization:class-or-none:student-or-none`.
    pub fn key(
        signal_type: SignalType,
        organization_id: &str,
        class_id: Option<&str>,
        student_id: Option<&str>,
    ) -> String {
        format!(
            "{}:{}:{}:{}",
            signal_type,
            organization_id,
            class_id.unwrap_or(NO_SCOPE_KEY),
            student_id.unwrap_or(NO_SCOPE_KEY)
        )
    }

    /// Start a signal whose id and recommended actions follow from its type
    /// and scoping keys. The scope is derived from which keys are set.
    pub fn builder(
        signal_type: SignalType,
        organization_id: &str,
        class_id: Option<String>,
        student_id: Option<String>,
    ) -> SignalBuilder {
        SignalBuilder {
            signal_type,
            organization_id: organization_id.to_string(),
            class_id,
            student_id,
        }
    }
}

pub struct SignalBuilder {
    signal_type: SignalType,
    organization_id: String,
    class_id: Option<String>,
    student_id: Option<String>,
}

impl SignalBuilder {
    pub fn finish(
        self,
        severity: Severity,
        title: String,
        summary: String,
        evidence: serde_json::Value,
        detected_at: DateTime<Utc>,
    ) -> Signal {
        let scope = if self.student_id.is_some() {
            SignalScope::Student
        } else if self.class_id.is_some() {
            SignalScope::Class
        } else {
            SignalScope::Organization
        };

        Signal {
            id: Signal::key(
                self.signal_type,
                &self.organization_id,
                self.class_id.as_deref(),
                self.student_id.as_deref(),
            ),
            signal_type: self.signal_type,
            severity,
            scope,
            organization_id: self.organization_id,
            class_id: self.class_id,
            student_id: self.student_id,
            title,
            summary,
            evidence,
            recommended_action_ids: self
                .signal_type
                .recommended_action_ids()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            detected_at,
        }
    }
}

/// An entry of the caller-supplied action catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopilotAction {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl fmt::Display for CopilotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn key_uses_sentinel_for_missing_scope() {
        assert_eq!(
            Signal::key(SignalType::EngagementRisk, "org_1", None, None),
            "engagement_risk:org_1:none:none"
        );
        assert_eq!(
            Signal::key(SignalType::RepeatedAbsence, "org_1", Some("c_1"), Some("s_1")),
            "repeated_absence:org_1:c_1:s_1"
        );
    }

    #[test]
    fn scope_follows_keys() {
        let student = Signal::builder(
            SignalType::RepeatedAbsence,
            "org_1",
            Some("c_1".to_string()),
            Some("s_1".to_string()),
        )
        .finish(Severity::High, "t".into(), "s".into(), serde_json::json!({}), at());
        assert_eq!(student.scope, SignalScope::Student);

        let class = Signal::builder(SignalType::ReportDelay, "org_1", Some("c_1".to_string()), None)
            .finish(Severity::Medium, "t".into(), "s".into(), serde_json::json!({}), at());
        assert_eq!(class.scope, SignalScope::Class);

        let org = Signal::builder(SignalType::EngagementRisk, "org_1", None, None)
            .finish(Severity::Critical, "t".into(), "s".into(), serde_json::json!({}), at());
        assert_eq!(org.scope, SignalScope::Organization);
        assert_eq!(org.recommended_action_ids[0], "open_organization_overview");
    }

    #[test]
    fn severity_ranks_are_ordered() {
        assert!(Severity::Critical.rank() > Severity::High.rank());
        assert!(Severity::High.rank() > Severity::Medium.rank());
        assert!(Severity::Medium.rank() > Severity::Low.rank());
        assert!(Severity::Critical > Severity::Low);
    }

    #[test]
    fn signal_serializes_in_camel_case() {
        let signal = Signal::builder(SignalType::AttendanceDrop, "org_1", Some("c_1".to_string()), None)
            .finish(Severity::High, "t".into(), "s".into(), serde_json::json!({"drop": 0.2}), at());
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["type"], "attendance_drop");
        assert_eq!(value["organizationId"], "org_1");
        assert_eq!(value["classId"], "c_1");
        assert!(value.get("studentId").is_none());
        assert_eq!(value["recommendedActionIds"][0], "review_class_attendance");
    }
}
