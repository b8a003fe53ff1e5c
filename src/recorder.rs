//! Turns arbiter transitions and keep-alive ticks into log and summary
//! mutations. Every session is accounted to the gathering date of its start.

use anyhow::Result;
use log::error;

use crate::arbiter::ActivityListener;
use crate::db::{SessionLogDao, SummaryDao};
use crate::error::TrackerError;
use crate::keepalive::{KeepAliveRecorder, KEEP_ALIVE_WINDOW_SECS};
use crate::models::{ActivitySession, CompletedSession, LogKind};

pub struct ActivityRecorder {
    program_logs: SessionLogDao,
    domain_logs: SessionLogDao,
    program_summaries: SummaryDao,
    domain_summaries: SummaryDao,
}

impl ActivityRecorder {
    pub fn new(
        program_logs: SessionLogDao,
        domain_logs: SessionLogDao,
        program_summaries: SummaryDao,
        domain_summaries: SummaryDao,
    ) -> Self {
        Self {
            program_logs,
            domain_logs,
            program_summaries,
            domain_summaries,
        }
    }

    fn stores(&self, kind: LogKind) -> (&SessionLogDao, &SummaryDao) {
        match kind {
            LogKind::Program => (&self.program_logs, &self.program_summaries),
            LogKind::Domain => (&self.domain_logs, &self.domain_summaries),
        }
    }

    /// Credits `seconds` of a partially used window directly.
    pub fn add_partial_window(&self, seconds: f64, session: &ActivitySession) {
        let (logs, summaries) = self.stores(session.kind());
        self.report("add_partial_window", session, || {
            logs.add_used_time(session, seconds)?;
            summaries.add_used_time(&session.identity(), seconds, session.start_time_utc())
        });
    }

    fn shift(&self, seconds: f64, session: &ActivitySession) -> Result<()> {
        let (logs, summaries) = self.stores(session.kind());
        logs.add_used_time(session, seconds)?;
        summaries.add_used_time(&session.identity(), seconds, session.start_time_utc())
    }

    /// Internal failures are logged and swallowed so the daemon keeps running.
    fn report(&self, op: &str, session: &ActivitySession, f: impl FnOnce() -> Result<()>) {
        if let Err(err) = f() {
            if err
                .downcast_ref::<TrackerError>()
                .is_some_and(|e| matches!(e, TrackerError::ImpossibleToGetHere { .. }))
            {
                error!(
                    "{op}: lost log row for '{}' started at {}; dropping session: {err}",
                    session.name(),
                    session.start_time()
                );
            } else {
                error!("{op} failed for '{}': {err:?}", session.name());
            }
        }
    }
}

impl KeepAliveRecorder for ActivityRecorder {
    fn add_ten_sec_to_end_time(&self, session: &ActivitySession) {
        self.report("add_ten_sec_to_end_time", session, || {
            self.shift(f64::from(KEEP_ALIVE_WINDOW_SECS), session)
        });
    }

    fn deduct_duration(&self, seconds: u32, session: &ActivitySession) {
        self.report("deduct_duration", session, || {
            self.shift(-f64::from(seconds), session)
        });
    }
}

impl ActivityListener for ActivityRecorder {
    fn on_new_session(&self, session: &ActivitySession) {
        let (logs, summaries) = self.stores(session.kind());
        self.report("on_new_session", session, || {
            logs.start_session(session)?;
            summaries.add_used_time(
                &session.identity(),
                f64::from(KEEP_ALIVE_WINDOW_SECS),
                session.start_time_utc(),
            )
        });
    }

    fn on_state_changed(&self, completed: &CompletedSession) {
        let (logs, _) = self.stores(completed.session.kind());
        self.report("finalize_log", &completed.session, || {
            logs.finalize_log(completed)
        });
    }
}
