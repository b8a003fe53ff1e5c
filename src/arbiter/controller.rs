use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use log::{debug, info};

use crate::clock::Clock;
use crate::keepalive::{EngineHost, KeepAliveEngine, KeepAliveRecorder};
use crate::models::{ActivitySession, ChromeSession, CompletedSession, ProgramSession};

use super::state::{ArbiterState, ArbiterStatus};

/// Persistence side of a transition.
pub trait ActivityListener: Send + Sync {
    fn on_new_session(&self, session: &ActivitySession);
    fn on_state_changed(&self, completed: &CompletedSession);
}

/// Display side of a transition; sees the incoming session.
pub trait UiListener: Send + Sync {
    fn on_state_changed(&self, session: &ActivitySession);
}

/// Single-writer state machine deciding which session owns wall-clock time.
///
/// Every input runs to completion under one lock, so concurrent callers queue
/// and at most one session is ever current. Within a transition the incoming
/// log row is opened before its engine starts, the outgoing engine is
/// concluded before the outgoing log is finalized, and recorder listeners are
/// notified before UI listeners.
pub struct ActivityArbiter {
    clock: Arc<dyn Clock>,
    host: Arc<dyn EngineHost>,
    engine_recorder: Arc<dyn KeepAliveRecorder>,
    recorders: Vec<Arc<dyn ActivityListener>>,
    ui: Vec<Arc<dyn UiListener>>,
    state: Mutex<ArbiterState>,
}

impl ActivityArbiter {
    pub fn new(
        clock: Arc<dyn Clock>,
        host: Arc<dyn EngineHost>,
        engine_recorder: Arc<dyn KeepAliveRecorder>,
    ) -> Self {
        Self {
            clock,
            host,
            engine_recorder,
            recorders: Vec::new(),
            ui: Vec::new(),
            state: Mutex::new(ArbiterState::Empty),
        }
    }

    pub fn add_recorder_listener(&mut self, listener: Arc<dyn ActivityListener>) {
        self.recorders.push(listener);
    }

    pub fn add_ui_listener(&mut self, listener: Arc<dyn UiListener>) {
        self.ui.push(listener);
    }

    fn state(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Option<ActivitySession> {
        self.state().session()
    }

    pub fn status(&self) -> ArbiterStatus {
        self.state().status()
    }

    pub fn set_program_state(&self, session: ProgramSession) -> Result<()> {
        self.transition(ActivitySession::Program(session))
    }

    pub fn set_chrome_state(&self, session: ChromeSession) -> Result<()> {
        self.transition(ActivitySession::Chrome(session))
    }

    fn transition(&self, mut incoming: ActivitySession) -> Result<()> {
        let mut state = self.state();

        let completed = state
            .take()
            .map(|outgoing| outgoing.complete(self.clock.now_utc()));

        if let Some(completed) = &completed {
            let mut repeated = incoming.is_same_session(&completed.session);
            // Sessions never overlap: nothing starts before the outgoing end.
            if !repeated && incoming.start_not_before(completed.end_time.with_timezone(&Utc)) {
                debug!(
                    "'{}' reported a start before '{}' ended; starting it at {}",
                    incoming.name(),
                    completed.session.name(),
                    incoming.start_time()
                );
                repeated = incoming.is_same_session(&completed.session);
            }
            if repeated {
                debug!("'{}' reported again; keeping it", incoming.name());
                *state = ArbiterState::from(completed.session.clone());
                return Ok(());
            }
        }

        for recorder in &self.recorders {
            recorder.on_new_session(&incoming);
        }

        let engine = KeepAliveEngine::new(incoming.clone(), Arc::clone(&self.engine_recorder));
        let swapped = self.host.replace_engine(engine);

        if let Some(completed) = &completed {
            debug!(
                "closing '{}' after {:.3}s",
                completed.session.name(),
                completed.duration_secs()
            );
            for recorder in &self.recorders {
                recorder.on_state_changed(completed);
            }
        }

        for listener in &self.ui {
            listener.on_state_changed(&incoming);
        }

        info!("now tracking {} '{}'", incoming.kind().as_str(), incoming.name());
        *state = ArbiterState::from(incoming);
        swapped
    }

    /// Closes the current session, if any, and stops the engine container.
    pub fn shutdown(&self) {
        let mut state = self.state();
        let completed = state.take().map(|current| current.complete(self.clock.now_utc()));

        self.host.stop();

        if let Some(completed) = &completed {
            for recorder in &self.recorders {
                recorder.on_state_changed(completed);
            }
        }
        info!("arbiter shut down");
    }
}
