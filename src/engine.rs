//! Signal orchestrator.
//!
//! Fetches every dataset for an organization concurrently, runs the two
//! builder phases, ranks the result and caches it per organization.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::cache::{InMemorySignalCache, SignalCache};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::Signal;
use crate::ranking;
use crate::risk::{self, BuildContext};
use crate::source::SignalDataSource;
use crate::window::{self, Windows};

pub struct SignalEngine<S, C = InMemorySignalCache> {
    source: S,
    cache: C,
    config: EngineConfig,
}

impl<S: SignalDataSource> SignalEngine<S, InMemorySignalCache> {
    pub fn new(source: S) -> Self {
        Self::with_cache(source, InMemorySignalCache::new(), EngineConfig::default())
    }
}

impl<S: SignalDataSource, C: SignalCache> SignalEngine<S, C> {
    pub fn with_cache(source: S, cache: C, config: EngineConfig) -> Self {
        Self { source, cache, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Drop every cached entry. Meant for test isolation.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Ranked signals for an organization.
    ///
    /// A blank organization id yields an empty list. `now_iso` pins the
    /// reference time; it defaults to the wall clock.
    pub async fn get_signals(
        &self,
        organization_id: &str,
        now_iso: Option<&str>,
    ) -> Result<Arc<Vec<Signal>>, EngineError> {
        let organization_id = organization_id.trim();
        if organization_id.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }

        let now = resolve_now(now_iso)?;
        if let Some(cached) = self.cache.get(organization_id, now) {
            debug!(organization_id, count = cached.len(), "signal cache hit");
            return Ok(cached);
        }

        let signals = Arc::new(self.compute(organization_id, now).await?);
        let ttl = Duration::from_std(self.config.cache_ttl).unwrap_or_else(|_| Duration::zero());
        self.cache
            .set(organization_id, Arc::clone(&signals), now, now + ttl);

        info!(organization_id, count = signals.len(), "signals computed");
        Ok(signals)
    }

    async fn compute(
        &self,
        organization_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>, EngineError> {
        let thresholds = &self.config.thresholds;
        let windows = Windows::new(now, thresholds);
        let source = &self.source;

        let (classes, students, attendance, session_logs, pending_reports, checkins) = tokio::try_join!(
            async {
                source
                    .get_classes(organization_id)
                    .await
                    .map_err(EngineError::fetch("classes"))
            },
            async {
                source
                    .get_students(organization_id)
                    .await
                    .map_err(EngineError::fetch("students"))
            },
            async {
                source
                    .get_attendance_all(organization_id)
                    .await
                    .map_err(EngineError::fetch("attendance"))
            },
            async {
                source
                    .get_session_logs_by_range(organization_id, windows.long_start, now)
                    .await
                    .map_err(EngineError::fetch("session logs"))
            },
            async {
                source
                    .list_pending_session_logs(organization_id)
                    .await
                    .map_err(EngineError::fetch("pending session logs"))
            },
            async {
                source
                    .list_checkins_by_range(organization_id, windows.recent_start, now)
                    .await
                    .map_err(EngineError::fetch("check-ins"))
            },
        )?;

        debug!(
            organization_id,
            classes = classes.len(),
            students = students.len(),
            attendance = attendance.len(),
            session_logs = session_logs.len(),
            pending_reports = pending_reports.len(),
            checkins = checkins.len(),
            "signal inputs fetched"
        );

        let ctx = BuildContext::new(organization_id, windows, thresholds, &classes, &students);
        let phase_one =
            risk::build_phase_one(&ctx, &session_logs, &attendance, &pending_reports, &checkins);
        let engagement = risk::build_engagement_risk(&ctx, &phase_one);

        let mut signals = phase_one.into_vec();
        signals.extend(engagement);
        Ok(ranking::dedupe_and_sort(signals))
    }
}

fn resolve_now(now_iso: Option<&str>) -> Result<DateTime<Utc>, EngineError> {
    match now_iso.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => window::parse_timestamp(value)
            .ok_or_else(|| EngineError::InvalidNow(value.to_string())),
        None => Ok(Utc::now()),
    }
}
