use std::{
    sync::{mpsc, Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};

use crate::error::TrackerError;

use super::engine::KeepAliveEngine;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the arbiter parks the engine of the current session.
pub trait EngineHost: Send + Sync {
    /// Concludes the running engine (if any), then installs and runs `engine`.
    fn replace_engine(&self, engine: KeepAliveEngine) -> Result<()>;
    /// Stops ticking and concludes the last engine.
    fn stop(&self);
}

struct Shared {
    engine: Mutex<Option<KeepAliveEngine>>,
    running: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn engine(&self) -> MutexGuard<'_, Option<KeepAliveEngine>> {
        self.engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn running(&self) -> MutexGuard<'_, bool> {
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

/// Owns the tick thread that drives `KeepAliveEngine::iterate_loop` once per
/// tick interval. Engine swaps happen under the engine lock, so an outgoing
/// engine is always concluded before its successor sees its first tick.
pub struct ThreadedEngineContainer {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    tick_interval: Duration,
}

impl ThreadedEngineContainer {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(None),
                running: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
            tick_interval,
        }
    }

    pub fn is_running(&self) -> bool {
        *self.shared.running()
    }

    pub fn has_engine(&self) -> bool {
        self.shared.engine().is_some()
    }

    pub fn start(&self) -> Result<()> {
        if !self.has_engine() {
            return Err(TrackerError::MissingEngine.into());
        }

        let mut worker = self.worker.lock().unwrap_or_else(|p| p.into_inner());
        if worker.is_some() {
            return Ok(());
        }

        *self.shared.running() = true;

        let shared = Arc::clone(&self.shared);
        let tick_interval = self.tick_interval;
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("keepalive-tick".into())
            .spawn(move || {
                tick_loop(&shared, tick_interval);
                let _ = done_tx.send(());
            })
            .context("failed to spawn keep-alive tick thread")?;

        *worker = Some(Worker { handle, done_rx });
        log_info!("keep-alive container started (tick every {:?})", tick_interval);
        Ok(())
    }

    fn halt_worker(&self) {
        *self.shared.running() = false;
        self.shared.wake.notify_all();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        if let Some(worker) = worker {
            match worker.done_rx.recv_timeout(STOP_JOIN_TIMEOUT) {
                Ok(()) => {
                    if worker.handle.join().is_err() {
                        log_warn!("keep-alive tick thread panicked");
                    }
                }
                Err(_) => {
                    log_warn!(
                        "keep-alive tick thread did not stop within {:?}; detaching",
                        STOP_JOIN_TIMEOUT
                    );
                }
            }
        }
    }
}

fn tick_loop(shared: &Shared, tick_interval: Duration) {
    loop {
        let running = shared.running();
        let (running, _) = shared
            .wake
            .wait_timeout_while(running, tick_interval, |running| *running)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !*running {
            break;
        }
        drop(running);

        if let Some(engine) = shared.engine().as_mut() {
            engine.iterate_loop();
        }

        if tick_interval.is_zero() {
            thread::yield_now();
        }
    }
}

impl EngineHost for ThreadedEngineContainer {
    fn replace_engine(&self, engine: KeepAliveEngine) -> Result<()> {
        {
            let mut slot = self.shared.engine();
            if let Some(mut outgoing) = slot.take() {
                outgoing.conclude();
            }
            *slot = Some(engine);
        }
        self.start()
    }

    fn stop(&self) {
        self.halt_worker();
        if let Some(mut last) = self.shared.engine().take() {
            last.conclude();
        }
        log_info!("keep-alive container stopped");
    }
}

impl Drop for ThreadedEngineContainer {
    fn drop(&mut self) {
        self.halt_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_kind;
    use crate::keepalive::engine::tests::{session, Call, RecordingRecorder};

    #[test]
    fn start_without_engine_fails() {
        let container = ThreadedEngineContainer::new(Duration::ZERO);
        let err = container.start().unwrap_err();
        assert!(is_kind(&err, |e| *e == TrackerError::MissingEngine));
        assert!(!container.is_running());
    }

    #[test]
    fn replace_engine_concludes_the_outgoing_engine_first() {
        let recorder = Arc::new(RecordingRecorder::default());
        let container = ThreadedEngineContainer::new(Duration::from_secs(3600));

        container
            .replace_engine(KeepAliveEngine::new(session("first"), recorder.clone()))
            .unwrap();
        container
            .replace_engine(KeepAliveEngine::new(session("second"), recorder.clone()))
            .unwrap();
        container.stop();

        assert_eq!(
            recorder.calls(),
            vec![
                Call::Deduct(10, "first".into()),
                Call::Deduct(10, "second".into()),
            ]
        );
        assert!(!container.is_running());
        assert!(!container.has_engine());
    }

    #[test]
    fn zero_interval_ticks_drive_the_engine() {
        let recorder = Arc::new(RecordingRecorder::default());
        let container = ThreadedEngineContainer::new(Duration::ZERO);
        container
            .replace_engine(KeepAliveEngine::new(session("busy"), recorder.clone()))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while recorder.calls().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        container.stop();

        let calls = recorder.calls();
        assert!(calls.iter().any(|c| matches!(c, Call::AddTen(_))));
        assert!(matches!(calls.last(), Some(Call::Deduct(_, _))));
    }
}
