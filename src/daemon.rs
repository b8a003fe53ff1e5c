//! Wires the accounting engine together and drives it from newline-delimited
//! JSON events on stdin.

use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::aggregator::parse_timestamp;
use crate::arbiter::{ActivityArbiter, UiListener};
use crate::browser::{run_tab_driver, TabChange, TabSessionFactory};
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::context::Context;
use crate::db::models::PrecomputedTimelineEntry;
use crate::db::{
    Database, PeripheralDao, QueuedSink, SessionLogDao, StatusDao, SummaryDao, WriteSink,
};
use crate::integrity::{IntegrityReport, SessionIntegrityAuditor};
use crate::keepalive::{EngineHost, ThreadedEngineContainer};
use crate::models::{ActivitySession, LogKind, PeripheralKind, SystemStatus};
use crate::peripherals::{precompute_day, AggregateSink, PeripheralBus};
use crate::programs::{ProgramSessionFactory, SysinfoResolver, WindowChange};
use crate::recorder::ActivityRecorder;
use crate::settings::SettingsStore;

const TAB_QUEUE_CAPACITY: usize = 64;

/// One line of the ingestion stream.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    Program(WindowChange),
    Tab(TabChange),
    Keyboard {
        #[serde(default)]
        timestamp: serde_json::Value,
    },
    Mouse {
        #[serde(default)]
        timestamp: serde_json::Value,
    },
    Sleep,
    Wake,
    HotReload,
}

/// Latest session shown to the user.
pub struct ActivitySnapshot {
    current: Mutex<Option<ActivitySession>>,
    verbose: bool,
}

impl ActivitySnapshot {
    fn new(verbose: bool) -> Self {
        Self {
            current: Mutex::new(None),
            verbose,
        }
    }

    pub fn current(&self) -> Option<ActivitySession> {
        self.current.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl UiListener for ActivitySnapshot {
    fn on_state_changed(&self, session: &ActivitySession) {
        if self.verbose {
            debug!(
                "showing {} '{}' ({}) since {}",
                session.kind().as_str(),
                session.name(),
                session.detail(),
                session.start_time()
            );
        }
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(session.clone());
    }
}

pub struct Tracker {
    config: TrackerConfig,
    ctx: Context,
    db: Database,
    queue: Arc<QueuedSink>,
    status: StatusDao,
    arbiter: Arc<ActivityArbiter>,
    snapshot: Arc<ActivitySnapshot>,
    peripherals: Arc<PeripheralBus>,
    programs: Arc<ProgramSessionFactory>,
    tabs: mpsc::Sender<TabChange>,
    tab_driver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    startup_report: IntegrityReport,
}

impl Tracker {
    /// Records the startup, audits the previous power-off interval and
    /// builds every component. Must run inside the tokio runtime.
    pub async fn start(config: TrackerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let ctx = Context::new(clock, config.local);
        let db = Database::new(config.db_path.clone())?;
        info!("database ready at {}", db.path().display());

        let status = StatusDao::new(db.clone());
        let startup = ctx.now_utc();
        let recorded = status.record_startup(startup).await?;
        info!("recorded {} at {startup}", recorded.as_str());

        let queue = Arc::new(QueuedSink::spawn(
            db.clone(),
            config.batch.clone(),
            &Handle::current(),
        )?);
        let sink: Arc<dyn WriteSink> = queue.clone();

        let dao = |kind| SessionLogDao::new(kind, db.clone(), sink.clone(), ctx.clone());
        let program_logs = dao(LogKind::Program);
        let domain_logs = dao(LogKind::Domain);
        let program_summaries =
            SummaryDao::new(LogKind::Program, db.clone(), sink.clone(), ctx.clone());
        let domain_summaries =
            SummaryDao::new(LogKind::Domain, db.clone(), sink.clone(), ctx.clone());

        let auditor = SessionIntegrityAuditor::new(
            status.clone(),
            vec![program_logs.clone(), domain_logs.clone()],
        );
        let startup_report = auditor.audit(startup).await?;

        let recorder = Arc::new(ActivityRecorder::new(
            program_logs,
            domain_logs,
            program_summaries,
            domain_summaries,
        ));
        let container: Arc<dyn EngineHost> =
            Arc::new(ThreadedEngineContainer::new(config.tick_interval));
        let snapshot = Arc::new(ActivitySnapshot::new(config.debug));
        let mut arbiter = ActivityArbiter::new(ctx.clock.clone(), container, recorder.clone());
        arbiter.add_recorder_listener(recorder);
        arbiter.add_ui_listener(snapshot.clone());
        let arbiter = Arc::new(arbiter);

        let aggregates: Arc<dyn AggregateSink> = Arc::new(PeripheralDao::new(db.clone(), sink));
        let peripherals = Arc::new(PeripheralBus::spawn(config.peripheral_timeouts, aggregates)?);

        let settings = Arc::new(SettingsStore::new(config.settings_path.clone())?);
        let programs = Arc::new(ProgramSessionFactory::new(
            config.local,
            settings.clone(),
            Box::new(SysinfoResolver::new()),
        ));
        let tab_factory = Arc::new(TabSessionFactory::new(config.local, settings));

        let cancel = CancellationToken::new();
        let (tabs, tab_rx) = mpsc::channel(TAB_QUEUE_CAPACITY);
        let tab_driver = tokio::spawn(run_tab_driver(
            tab_rx,
            config.tab_debounce,
            tab_factory,
            arbiter.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            config,
            ctx,
            db,
            queue,
            status,
            arbiter,
            snapshot,
            peripherals,
            programs,
            tabs,
            tab_driver: Mutex::new(Some(tab_driver)),
            cancel,
            startup_report,
        })
    }

    pub fn startup_report(&self) -> &IntegrityReport {
        &self.startup_report
    }

    pub fn current_activity(&self) -> Option<ActivitySession> {
        self.snapshot.current()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn handle(&self, event: IngestEvent) -> Result<()> {
        match event {
            IngestEvent::Program(change) => {
                let programs = self.programs.clone();
                let arbiter = self.arbiter.clone();
                tokio::task::spawn_blocking(move || {
                    let session = programs.to_session(&change)?;
                    arbiter.set_program_state(session)
                })
                .await?
            }
            IngestEvent::Tab(tab) => self
                .tabs
                .send(tab)
                .await
                .map_err(|_| anyhow::anyhow!("tab driver has stopped")),
            IngestEvent::Keyboard { timestamp } => self
                .peripherals
                .publish(PeripheralKind::Keyboard, parse_timestamp(&timestamp)?),
            IngestEvent::Mouse { timestamp } => self
                .peripherals
                .publish(PeripheralKind::Mouse, parse_timestamp(&timestamp)?),
            IngestEvent::Sleep => self.sleep().await,
            IngestEvent::Wake => self.record_status(SystemStatus::Wake).await,
            IngestEvent::HotReload => Ok(()),
        }
    }

    async fn record_status(&self, status: SystemStatus) -> Result<()> {
        let dao = self.status.clone();
        let at = self.ctx.now_utc();
        tokio::task::spawn_blocking(move || dao.record(status, at)).await?
    }

    /// Closes the current session and flushes open peripheral bursts. The
    /// next window change restarts tracking.
    pub async fn sleep(&self) -> Result<()> {
        self.record_status(SystemStatus::Sleep).await?;
        let arbiter = self.arbiter.clone();
        let peripherals = self.peripherals.clone();
        tokio::task::spawn_blocking(move || {
            arbiter.shutdown();
            peripherals.flush()
        })
        .await?
    }

    pub async fn precompute_timeline(
        &self,
        day: DateTime<Utc>,
    ) -> Result<Vec<PrecomputedTimelineEntry>> {
        precompute_day(&self.db, &self.ctx, day, self.config.timeline_merge_threshold).await
    }

    /// Cooperative shutdown: the status is written directly, then the current
    /// session is closed, producers stop and the write queue drains. Failures
    /// are reported on stderr and never abort the sequence.
    pub async fn shutdown(&self, status: SystemStatus) {
        if let Err(err) = self.record_status(status).await {
            eprintln!("failed to record {}: {err:?}", status.as_str());
        }

        self.cancel.cancel();
        let driver = self
            .tab_driver
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(driver) = driver {
            if let Err(err) = driver.await {
                eprintln!("tab driver ended abnormally: {err:?}");
            }
        }

        let arbiter = self.arbiter.clone();
        let peripherals = self.peripherals.clone();
        let closed = tokio::task::spawn_blocking(move || {
            arbiter.shutdown();
            peripherals.shutdown();
        })
        .await;
        if let Err(err) = closed {
            eprintln!("failed to close the current session: {err:?}");
        }

        if let Err(err) = self.queue.shutdown().await {
            eprintln!("{err:?}");
        }

        let now = self.ctx.now_utc();
        match self.precompute_timeline(now).await {
            Ok(entries) => info!("precomputed {} timeline entries", entries.len()),
            Err(err) => eprintln!("failed to precompute timeline: {err:?}"),
        }
        info!("tracker stopped after {}", status.as_str());
    }
}

/// Runs until Ctrl-C or a hot-reload request. Stdin closing only stops
/// ingestion.
pub async fn run(config: TrackerConfig, clock: Arc<dyn Clock>) -> Result<()> {
    let tracker = Tracker::start(config, clock)
        .await
        .context("failed to start tracker")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ingesting = true;

    let final_status = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    error!("failed to listen for Ctrl-C: {err}");
                }
                break SystemStatus::CtrlCSignal;
            }
            line = lines.next_line(), if ingesting => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<IngestEvent>(&line) {
                    Ok(IngestEvent::HotReload) => break SystemStatus::HotReloadStarted,
                    Ok(event) => {
                        if let Err(err) = tracker.handle(event).await {
                            warn!("event rejected: {err}");
                        }
                    }
                    Err(err) => warn!("unreadable event '{line}': {err}"),
                },
                Ok(None) => {
                    info!("input closed; waiting for Ctrl-C");
                    ingesting = false;
                }
                Err(err) => {
                    error!("failed to read input: {err}");
                    ingesting = false;
                }
            },
        }
    };

    tracker.shutdown(final_status).await;
    Ok(())
}
