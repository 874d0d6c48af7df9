use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, CheckinRecord, ClassRecord, PendingReportRecord, SessionLogRecord,
    StudentRecord, ABSENT_STATUS,
};
use crate::source::SignalDataSource;
use crate::window;

pub const DEMO_ORGANIZATION: &str = "org_demo";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed collaborator. Every query is scoped by organization.
#[derive(Debug, Clone)]
pub struct PgSignalSource {
    pool: PgPool,
}

impl PgSignalSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalDataSource for PgSignalSource {
    async fn get_classes(&self, organization_id: &str) -> anyhow::Result<Vec<ClassRecord>> {
        let rows = sqlx::query(
            "SELECT id, name FROM coaching_signals.classes WHERE organization_id = $1 ORDER BY id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClassRecord {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn get_students(&self, organization_id: &str) -> anyhow::Result<Vec<StudentRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, class_id FROM coaching_signals.students \
             WHERE organization_id = $1 ORDER BY id",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StudentRecord {
                id: row.get("id"),
                name: row.get("name"),
                class_id: row.get("class_id"),
            })
            .collect())
    }

    async fn get_attendance_all(
        &self,
        organization_id: &str,
    ) -> anyhow::Result<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            "SELECT student_id, class_id, status, date, created_at \
             FROM coaching_signals.attendance \
             WHERE organization_id = $1 \
             ORDER BY student_id, date DESC, created_at DESC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let date: NaiveDate = row.get("date");
                let created_at: DateTime<Utc> = row.get("created_at");
                AttendanceRecord {
                    student_id: row.get("student_id"),
                    class_id: row.get("class_id"),
                    status: row.get("status"),
                    date: date.to_string(),
                    created_at: Some(window::to_iso(created_at)),
                }
            })
            .collect())
    }

    async fn get_session_logs_by_range(
        &self,
        organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SessionLogRecord>> {
        let rows = sqlx::query(
            "SELECT class_id, attendance, created_at FROM coaching_signals.session_logs \
             WHERE organization_id = $1 AND created_at BETWEEN $2 AND $3 \
             ORDER BY created_at",
        )
        .bind(organization_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let attendance: Option<f64> = row.get("attendance");
                let created_at: DateTime<Utc> = row.get("created_at");
                SessionLogRecord {
                    class_id: row.get("class_id"),
                    attendance: attendance.unwrap_or(f64::NAN),
                    created_at: window::to_iso(created_at),
                }
            })
            .collect())
    }

    async fn list_pending_session_logs(
        &self,
        organization_id: &str,
    ) -> anyhow::Result<Vec<PendingReportRecord>> {
        // A class is pending when nothing was logged since the week started.
        let rows = sqlx::query(
            r#"
            SELECT c.id AS class_id, c.name AS class_name, c.unit,
                   date_trunc('week', now())::date AS period_start,
                   MAX(sl.created_at) AS last_report_at
            FROM coaching_signals.classes c
            LEFT JOIN coaching_signals.session_logs sl
                ON sl.class_id = c.id AND sl.organization_id = c.organization_id
            WHERE c.organization_id = $1
            GROUP BY c.id, c.name, c.unit
            HAVING MAX(sl.created_at) IS NULL
                OR MAX(sl.created_at) < date_trunc('week', now())
            ORDER BY c.id
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let period_start: NaiveDate = row.get("period_start");
                let last_report_at: Option<DateTime<Utc>> = row.get("last_report_at");
                PendingReportRecord {
                    class_id: row.get("class_id"),
                    class_name: row.get("class_name"),
                    unit: row.get("unit"),
                    period_start: Some(period_start.to_string()),
                    last_report_at: last_report_at.map(window::to_iso),
                }
            })
            .collect())
    }

    async fn list_checkins_by_range(
        &self,
        organization_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CheckinRecord>> {
        let rows = sqlx::query(
            "SELECT class_id, checked_in_at FROM coaching_signals.checkins \
             WHERE organization_id = $1 AND checked_in_at BETWEEN $2 AND $3 \
             ORDER BY checked_in_at",
        )
        .bind(organization_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let checked_in_at: DateTime<Utc> = row.get("checked_in_at");
                CheckinRecord {
                    class_id: row.get("class_id"),
                    checked_in_at: window::to_iso(checked_in_at),
                }
            })
            .collect())
    }
}

/// Replace the demo organization with data that trips every builder.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for table in ["checkins", "session_logs", "attendance", "students", "classes"] {
        sqlx::query(&format!(
            "DELETE FROM coaching_signals.{table} WHERE organization_id = $1"
        ))
        .bind(DEMO_ORGANIZATION)
        .execute(&mut *tx)
        .await?;
    }

    let classes = [
        ("demo_c_1", "Sub-13 Morning", "North"),
        ("demo_c_2", "Sub-15 Evening", "North"),
        ("demo_c_3", "Adult Beginners", "South"),
    ];
    for (id, name, unit) in classes {
        sqlx::query(
            "INSERT INTO coaching_signals.classes (id, organization_id, name, unit) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(DEMO_ORGANIZATION)
        .bind(name)
        .bind(unit)
        .execute(&mut *tx)
        .await?;
    }

    let students = [
        ("demo_s_1", "Ana Costa", "demo_c_1"),
        ("demo_s_2", "Bruno Lima", "demo_c_1"),
        ("demo_s_3", "Carla Souza", "demo_c_2"),
    ];
    for (id, name, class_id) in students {
        sqlx::query(
            "INSERT INTO coaching_signals.students (id, organization_id, name, class_id) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(DEMO_ORGANIZATION)
        .bind(name)
        .bind(class_id)
        .execute(&mut *tx)
        .await?;
    }

    // Ana misses four sessions in a row; Bruno misses two.
    let attendance = [
        ("demo_s_1", "demo_c_1", ABSENT_STATUS, 1),
        ("demo_s_1", "demo_c_1", ABSENT_STATUS, 4),
        ("demo_s_1", "demo_c_1", ABSENT_STATUS, 8),
        ("demo_s_1", "demo_c_1", ABSENT_STATUS, 11),
        ("demo_s_1", "demo_c_1", "presente", 15),
        ("demo_s_2", "demo_c_1", ABSENT_STATUS, 1),
        ("demo_s_2", "demo_c_1", ABSENT_STATUS, 4),
        ("demo_s_2", "demo_c_1", "presente", 8),
    ];
    for (student_id, class_id, status, days_ago) in attendance {
        let at = now - Duration::days(days_ago);
        sqlx::query(
            "INSERT INTO coaching_signals.attendance \
             (id, organization_id, student_id, class_id, status, date, created_at, source_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(DEMO_ORGANIZATION)
        .bind(student_id)
        .bind(class_id)
        .bind(status)
        .bind(at.date_naive())
        .bind(at)
        .bind(format!("seed-{student_id}-{days_ago}"))
        .execute(&mut *tx)
        .await?;
    }

    // demo_c_1 drops from ~0.88 to ~0.60; demo_c_3 has never been reported.
    let session_logs = [
        ("demo_c_1", 0.62, 9),
        ("demo_c_1", 0.58, 12),
        ("demo_c_1", 0.90, 17),
        ("demo_c_1", 0.86, 22),
        ("demo_c_2", 0.81, 10),
        ("demo_c_2", 0.84, 20),
    ];
    for (class_id, value, days_ago) in session_logs {
        sqlx::query(
            "INSERT INTO coaching_signals.session_logs \
             (id, organization_id, class_id, attendance, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(DEMO_ORGANIZATION)
        .bind(class_id)
        .bind(value)
        .bind(now - Duration::days(days_ago))
        .execute(&mut *tx)
        .await?;
    }

    // demo_c_2 usually sees eight taps a day; yesterday only two.
    let checkins = [(4, 8), (3, 8), (2, 7), (1, 2)];
    for (days_ago, count) in checkins {
        for minute in 0..count {
            sqlx::query(
                "INSERT INTO coaching_signals.checkins \
                 (id, organization_id, class_id, checked_in_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(DEMO_ORGANIZATION)
            .bind("demo_c_2")
            .bind(now - Duration::days(days_ago) + Duration::minutes(minute))
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    info!(organization_id = DEMO_ORGANIZATION, "seed data inserted");
    Ok(())
}

/// Import attendance rows. Rows whose `source_key` already exists are
/// skipped; returns how many were inserted.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        organization_id: String,
        student_id: String,
        class_id: Option<String>,
        status: String,
        date: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row.source_key.unwrap_or_else(|| {
            format!(
                "import-{}-{}-{}",
                row.organization_id, row.student_id, row.date
            )
        });

        let result = sqlx::query(
            r#"
            INSERT INTO coaching_signals.attendance
            (id, organization_id, student_id, class_id, status, date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.organization_id)
        .bind(&row.student_id)
        .bind(row.class_id.as_deref().filter(|id| !id.is_empty()))
        .bind(&row.status)
        .bind(row.date)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
