//! Data access collaborators consumed by the engine.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AttendanceRecord, CheckinRecord, ClassRecord, PendingReportRecord, SessionLogRecord,
    StudentRecord,
};
use crate::window;

/// Raw records for one organization. Implementations own the data; the
/// engine only reads it.
#[async_trait]
pub trait SignalDataSource: Send + Sync {
    async fn get_classes(&self, organization_id: &str) -> anyhow::Result<Vec<ClassRecord>>;

    async fn get_students(&self, organization_id: &str) -> anyhow::Result<Vec<StudentRecord>>;

    async fn get_attendance_all(&self, organization_id: &str)
        -> anyhow::Result<Vec<AttendanceRecord>>;

    async fn get_session_logs_by_range(
        &self,
        organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SessionLogRecord>>;

    async fn list_pending_session_logs(
        &self,
        organization_id: &str,
    ) -> anyhow::Result<Vec<PendingReportRecord>>;

    async fn list_checkins_by_range(
        &self,
        organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CheckinRecord>>;
}

/// Every dataset of a single organization, as exported to JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataSnapshot {
    pub classes: Vec<ClassRecord>,
    pub students: Vec<StudentRecord>,
    pub attendance: Vec<AttendanceRecord>,
    pub session_logs: Vec<SessionLogRecord>,
    pub pending_reports: Vec<PendingReportRecord>,
    pub checkins: Vec<CheckinRecord>,
}

impl DataSnapshot {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid snapshot {}", path.display()))
    }
}

/// Serves a [`DataSnapshot`] regardless of the organization asked for.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    snapshot: DataSnapshot,
}

impl SnapshotSource {
    pub fn new(snapshot: DataSnapshot) -> Self {
        Self { snapshot }
    }
}

fn in_range(value: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    window::parse_timestamp(value).is_some_and(|ts| ts >= from && ts <= to)
}

#[async_trait]
impl SignalDataSource for SnapshotSource {
    async fn get_classes(&self, _organization_id: &str) -> anyhow::Result<Vec<ClassRecord>> {
        Ok(self.snapshot.classes.clone())
    }

    async fn get_students(&self, _organization_id: &str) -> anyhow::Result<Vec<StudentRecord>> {
        Ok(self.snapshot.students.clone())
    }

    async fn get_attendance_all(
        &self,
        _organization_id: &str,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        Ok(self.snapshot.attendance.clone())
    }

    async fn get_session_logs_by_range(
        &self,
        _organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SessionLogRecord>> {
        Ok(self
            .snapshot
            .session_logs
            .iter()
            .filter(|log| in_range(&log.created_at, from, to))
            .cloned()
            .collect())
    }

    async fn list_pending_session_logs(
        &self,
        _organization_id: &str,
    ) -> anyhow::Result<Vec<PendingReportRecord>> {
        Ok(self.snapshot.pending_reports.clone())
    }

    async fn list_checkins_by_range(
        &self,
        _organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CheckinRecord>> {
        Ok(self
            .snapshot
            .checkins
            .iter()
            .filter(|checkin| in_range(&checkin.checked_in_at, from, to))
            .cloned()
            .collect())
    }
}
