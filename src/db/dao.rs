//! Data access objects: writes go through a `WriteSink`, reads straight to
//! the database worker.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};

use crate::context::Context;
use crate::keepalive::KEEP_ALIVE_WINDOW_SECS;
use crate::models::{
    ActivitySession, CompletedSession, Identity, LogKind, PeripheralAggregate, PeripheralKind,
    SystemStatus,
};

use super::{
    connection::Database,
    models::{DailySummary, SessionLog, StatusRecord},
    repositories::system_status::{insert_status, latest_status},
    sink::{DirectSink, WriteSink},
    writes::StoreWrite,
};

fn ensure_kind(expected: LogKind, actual: LogKind) -> Result<()> {
    if expected != actual {
        bail!(
            "{} session routed to the {} store",
            actual.as_str(),
            expected.as_str()
        );
    }
    Ok(())
}

/// Per-session rows of one log table.
#[derive(Clone)]
pub struct SessionLogDao {
    kind: LogKind,
    db: Database,
    sink: Arc<dyn WriteSink>,
    ctx: Context,
}

impl SessionLogDao {
    pub fn new(kind: LogKind, db: Database, sink: Arc<dyn WriteSink>, ctx: Context) -> Self {
        Self {
            kind,
            db,
            sink,
            ctx,
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Opens the row with the end-time one keep-alive window ahead.
    pub fn start_session(&self, session: &ActivitySession) -> Result<()> {
        ensure_kind(self.kind, session.kind())?;
        let start_time = session.start_time_utc();
        self.sink.submit(StoreWrite::OpenLog {
            identity: session.identity(),
            detail: session.detail().to_string(),
            productive: session.productive(),
            start_time,
            initial_secs: f64::from(KEEP_ALIVE_WINDOW_SECS),
            gathering_date: self.ctx.day_of(start_time),
            created_at: self.ctx.now_utc(),
        })
    }

    pub async fn find_session(&self, session: &ActivitySession) -> Result<Option<SessionLog>> {
        ensure_kind(self.kind, session.kind())?;
        self.db
            .find_session_log(session.identity(), session.start_time_utc())
            .await
    }

    pub fn push_window_ahead_ten_sec(&self, session: &ActivitySession) -> Result<()> {
        self.add_used_time(session, f64::from(KEEP_ALIVE_WINDOW_SECS))
    }

    pub fn add_used_time(&self, session: &ActivitySession, seconds: f64) -> Result<()> {
        ensure_kind(self.kind, session.kind())?;
        self.sink.submit(StoreWrite::ShiftLog {
            identity: session.identity(),
            start_time: session.start_time_utc(),
            seconds,
        })
    }

    pub fn deduct_remaining_duration(&self, session: &ActivitySession, seconds: f64) -> Result<()> {
        self.add_used_time(session, -seconds)
    }

    /// Stamps the precise end-time and duration. Hours are left as the
    /// keep-alive bookkeeping put them.
    pub fn finalize_log(&self, completed: &CompletedSession) -> Result<()> {
        ensure_kind(self.kind, completed.session.kind())?;
        self.sink.submit(StoreWrite::FinalizeLog {
            identity: completed.session.identity(),
            start_time: completed.session.start_time_utc(),
            end_time: completed.end_time.with_timezone(&Utc),
            duration_secs: completed.duration_secs(),
        })
    }

    pub async fn read_day(&self, day: DateTime<Utc>) -> Result<Vec<SessionLog>> {
        self.db
            .read_logs_for_day(self.kind, self.ctx.day_of(day))
            .await
    }

    pub async fn read_all(&self) -> Result<Vec<SessionLog>> {
        self.db.read_all_logs(self.kind).await
    }

    pub async fn read_last_24_hrs(&self, now: DateTime<Utc>) -> Result<Vec<SessionLog>> {
        self.db
            .read_logs_since(self.kind, now - Duration::hours(24))
            .await
    }

    /// Today plus the six local days before it.
    pub async fn read_past_week(&self, now: DateTime<Utc>) -> Result<Vec<SessionLog>> {
        let since = self.ctx.local.days_before(now, 6);
        self.db.read_logs_gathered_since(self.kind, since).await
    }

    /// Today plus the 29 local days before it.
    pub async fn read_past_month(&self, now: DateTime<Utc>) -> Result<Vec<SessionLog>> {
        let since = self.ctx.local.days_before(now, 29);
        self.db.read_logs_gathered_since(self.kind, since).await
    }

    pub async fn find_orphans(
        &self,
        shutdown: DateTime<Utc>,
        startup: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.db.find_orphan_logs(self.kind, shutdown, startup).await
    }

    pub async fn find_phantoms(
        &self,
        shutdown: Option<DateTime<Utc>>,
        startup: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.db.find_phantom_logs(self.kind, shutdown, startup).await
    }
}

/// Per-day totals of one summary table.
#[derive(Clone)]
pub struct SummaryDao {
    kind: LogKind,
    db: Database,
    sink: Arc<dyn WriteSink>,
    ctx: Context,
}

impl SummaryDao {
    pub fn new(kind: LogKind, db: Database, sink: Arc<dyn WriteSink>, ctx: Context) -> Self {
        Self {
            kind,
            db,
            sink,
            ctx,
        }
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Adds `seconds` to the `(identity, day)` row, creating it if needed.
    pub fn add_used_time(
        &self,
        identity: &Identity,
        seconds: f64,
        day: DateTime<Utc>,
    ) -> Result<()> {
        ensure_kind(self.kind, identity.kind())?;
        self.sink.submit(StoreWrite::AdjustSummary {
            identity: identity.clone(),
            gathering_date: self.ctx.day_of(day),
            seconds,
        })
    }

    pub fn push_window_ahead_ten_sec(&self, identity: &Identity, day: DateTime<Utc>) -> Result<()> {
        self.add_used_time(identity, f64::from(KEEP_ALIVE_WINDOW_SECS), day)
    }

    pub fn deduct_remaining_duration(
        &self,
        identity: &Identity,
        seconds: f64,
        day: DateTime<Utc>,
    ) -> Result<()> {
        self.add_used_time(identity, -seconds, day)
    }

    pub async fn find(&self, identity: &Identity, day: DateTime<Utc>) -> Result<Option<DailySummary>> {
        ensure_kind(self.kind, identity.kind())?;
        self.db
            .find_summary(identity.clone(), self.ctx.day_of(day))
            .await
    }

    pub async fn read_day(&self, day: DateTime<Utc>) -> Result<Vec<DailySummary>> {
        self.db
            .read_summaries_for_day(self.kind, self.ctx.day_of(day))
            .await
    }

    pub async fn read_all(&self) -> Result<Vec<DailySummary>> {
        self.db.read_all_summaries(self.kind).await
    }

    /// Today plus the six local days before it.
    pub async fn read_past_week(&self, now: DateTime<Utc>) -> Result<Vec<DailySummary>> {
        let since = self.ctx.local.days_before(now, 6);
        self.db.read_summaries_since(self.kind, since).await
    }

    /// Today plus the 29 local days before it.
    pub async fn read_past_month(&self, now: DateTime<Utc>) -> Result<Vec<DailySummary>> {
        let since = self.ctx.local.days_before(now, 29);
        self.db.read_summaries_since(self.kind, since).await
    }
}

/// Append-only power/lifecycle log. Writes bypass the queue and land before
/// `record` returns.
#[derive(Clone)]
pub struct StatusDao {
    db: Database,
    direct: DirectSink,
}

impl StatusDao {
    pub fn new(db: Database) -> Self {
        Self {
            direct: DirectSink::new(db.clone()),
            db,
        }
    }

    pub fn record(&self, status: SystemStatus, at: DateTime<Utc>) -> Result<()> {
        self.direct.submit(StoreWrite::RecordStatus {
            status,
            created_at: at,
        })
    }

    /// Records the start of a power-on interval. A startup that follows a
    /// hot-reload is recorded as its conclusion instead.
    pub async fn record_startup(&self, at: DateTime<Utc>) -> Result<SystemStatus> {
        self.db
            .execute(move |conn| {
                let previous = latest_status(conn)?;
                let status = match previous.map(|r| r.status) {
                    Some(SystemStatus::HotReloadStarted) => SystemStatus::HotReloadConcluded,
                    _ => SystemStatus::Startup,
                };
                insert_status(conn, status, at)?;
                Ok(status)
            })
            .await
    }

    pub async fn latest(&self) -> Result<Option<StatusRecord>> {
        self.db.latest_status().await
    }

    pub async fn latest_shutdown_class(&self, before: DateTime<Utc>) -> Result<Option<StatusRecord>> {
        self.db.latest_shutdown_class(before).await
    }

    pub async fn read_all(&self) -> Result<Vec<StatusRecord>> {
        self.db.read_statuses().await
    }
}

/// Keyboard/mouse aggregates and their timeline mirror.
#[derive(Clone)]
pub struct PeripheralDao {
    db: Database,
    sink: Arc<dyn WriteSink>,
}

impl PeripheralDao {
    pub fn new(db: Database, sink: Arc<dyn WriteSink>) -> Self {
        Self { db, sink }
    }

    pub async fn read_aggregates(
        &self,
        kind: PeripheralKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PeripheralAggregate>> {
        self.db.read_aggregates(kind, from, to).await
    }

    pub fn insert(&self, aggregate: PeripheralAggregate) -> Result<()> {
        self.sink.submit(StoreWrite::InsertAggregate(aggregate))
    }
}
