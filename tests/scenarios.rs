use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};

use activity_tracker_lib::arbiter::{ActivityArbiter, ArbiterStatus};
use activity_tracker_lib::clock::{MockClock, UserLocalTime};
use activity_tracker_lib::context::Context;
use activity_tracker_lib::db::{Database, DirectSink, SessionLogDao, SummaryDao, WriteSink};
use activity_tracker_lib::keepalive::{EngineHost, KeepAliveEngine};
use activity_tracker_lib::models::{LogKind, ProgramSession};
use activity_tracker_lib::recorder::ActivityRecorder;

/// Engine host whose ticks are issued by the test instead of a thread.
#[derive(Default)]
struct SteppedHost {
    engine: Mutex<Option<KeepAliveEngine>>,
}

impl SteppedHost {
    fn step(&self, ticks: u32) {
        let mut slot = self.engine.lock().unwrap();
        let engine = slot.as_mut().expect("an engine is installed");
        for _ in 0..ticks {
            engine.iterate_loop();
        }
    }
}

impl EngineHost for SteppedHost {
    fn replace_engine(&self, engine: KeepAliveEngine) -> Result<()> {
        let mut slot = self.engine.lock().unwrap();
        if let Some(mut outgoing) = slot.take() {
            outgoing.conclude();
        }
        *slot = Some(engine);
        Ok(())
    }

    fn stop(&self) {
        if let Some(mut last) = self.engine.lock().unwrap().take() {
            last.conclude();
        }
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

fn program(name: &str, offset: i64) -> ProgramSession {
    ProgramSession {
        exe_path: format!("/usr/bin/{name}"),
        process_name: name.to_string(),
        window_title: name.to_string(),
        detail: String::new(),
        start_time: (t0() + Duration::seconds(offset)).with_timezone(&chrono_tz::UTC),
        productive: true,
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

struct Fixture {
    _dir: tempfile::TempDir,
    program_logs: SessionLogDao,
    program_summaries: SummaryDao,
    host: Arc<SteppedHost>,
    arbiter: ActivityArbiter,
}

fn fixture(ends: &[i64]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("tracker.db")).unwrap();
    let sink: Arc<dyn WriteSink> = Arc::new(DirectSink::new(db.clone()));
    let ctx = Context::system(UserLocalTime::new(chrono_tz::UTC));

    let program_logs = SessionLogDao::new(LogKind::Program, db.clone(), sink.clone(), ctx.clone());
    let program_summaries = SummaryDao::new(LogKind::Program, db.clone(), sink.clone(), ctx.clone());
    let recorder = Arc::new(ActivityRecorder::new(
        program_logs.clone(),
        SessionLogDao::new(LogKind::Domain, db.clone(), sink.clone(), ctx.clone()),
        program_summaries.clone(),
        SummaryDao::new(LogKind::Domain, db, sink, ctx),
    ));

    let host = Arc::new(SteppedHost::default());
    let clock = Arc::new(MockClock::new(
        ends.iter().map(|s| t0() + Duration::seconds(*s)),
    ));
    let mut arbiter = ActivityArbiter::new(clock, host.clone(), recorder.clone());
    arbiter.add_recorder_listener(recorder);

    Fixture {
        _dir: dir,
        program_logs,
        program_summaries,
        host,
        arbiter,
    }
}

#[test]
fn three_programs_without_chrome_are_accounted_exactly() {
    let Fixture {
        _dir,
        program_logs,
        program_summaries,
        host,
        arbiter,
    } = fixture(&[23, 45, 63]);

    arbiter.set_program_state(program("alpha", 0)).unwrap();
    host.step(23);
    arbiter.set_program_state(program("beta", 23)).unwrap();
    host.step(22);
    arbiter.set_program_state(program("gamma", 45)).unwrap();
    host.step(18);
    arbiter.shutdown();

    assert_eq!(arbiter.status(), ArbiterStatus::Empty);

    let logs = block_on(program_logs.read_all()).unwrap();
    let durations: Vec<_> = logs.iter().map(|l| l.duration_in_sec).collect();
    assert_eq!(durations, vec![Some(23.0), Some(22.0), Some(18.0)]);
    for log in &logs {
        let seconds = log.duration_in_sec.unwrap();
        assert!((log.hours_spent - seconds / 3600.0).abs() < 1e-12);
        assert_eq!(
            log.end_time.unwrap() - log.start_time,
            Duration::seconds(seconds as i64)
        );
    }

    let summaries = block_on(program_summaries.read_day(t0())).unwrap();
    assert_eq!(summaries.len(), 3);
    for (name, seconds) in [("alpha", 23.0), ("beta", 22.0), ("gamma", 18.0)] {
        let summary = summaries
            .iter()
            .find(|s| s.identity.name() == name)
            .unwrap();
        assert!((summary.hours_spent - seconds / 3600.0).abs() < 1e-9);
    }
}

#[test]
fn reused_start_time_keeps_both_sessions_conserved() {
    let f = fixture(&[5, 20]);

    f.arbiter.set_program_state(program("alpha", 0)).unwrap();
    f.host.step(5);
    f.arbiter.set_program_state(program("beta", 0)).unwrap();
    f.host.step(15);
    f.arbiter.shutdown();

    let logs = block_on(f.program_logs.read_all()).unwrap();
    assert_eq!(logs.len(), 2);
    for (log, (name, seconds)) in logs.iter().zip([("alpha", 5.0), ("beta", 15.0)]) {
        assert_eq!(log.identity.name(), name);
        assert_eq!(log.duration_in_sec, Some(seconds));
        assert!((log.hours_spent - seconds / 3600.0).abs() < 1e-12);
    }
    assert_eq!(logs[1].start_time, logs[0].end_time.unwrap());

    let summaries = block_on(f.program_summaries.read_day(t0())).unwrap();
    let total: f64 = summaries.iter().map(|s| s.hours_spent).sum();
    assert!((total - 20.0 / 3600.0).abs() < 1e-12);
}

#[test]
fn zero_length_session_with_a_shared_start_is_finalized_on_its_own_row() {
    let f = fixture(&[0, 12]);

    f.arbiter.set_program_state(program("alpha", 0)).unwrap();
    f.arbiter.set_program_state(program("beta", 0)).unwrap();
    f.host.step(12);
    f.arbiter.shutdown();

    let logs = block_on(f.program_logs.read_all()).unwrap();
    let durations: Vec<_> = logs
        .iter()
        .map(|l| (l.identity.name().to_string(), l.duration_in_sec))
        .collect();
    assert_eq!(
        durations,
        vec![("alpha".to_string(), Some(0.0)), ("beta".to_string(), Some(12.0))]
    );
    assert!(logs[0].hours_spent.abs() < 1e-12);
    assert!((logs[1].hours_spent - 12.0 / 3600.0).abs() < 1e-12);
}
