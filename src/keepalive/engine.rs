use std::sync::Arc;

use crate::models::ActivitySession;

/// Seconds by which a session's recorded end-time is pushed per window.
pub const KEEP_ALIVE_WINDOW_SECS: u32 = 10;

/// Storage side of the keep-alive protocol.
pub trait KeepAliveRecorder: Send + Sync {
    fn add_ten_sec_to_end_time(&self, session: &ActivitySession);
    fn deduct_duration(&self, seconds: u32, session: &ActivitySession);
}

/// Counts seconds inside the current push window for one session.
///
/// The log row starts one full window ahead, so every completed window pushes
/// another one and `conclude` hands back whatever part of the last window
/// went unused. After `n` iterations and one `conclude`, exactly `n` seconds
/// have been recorded.
pub struct KeepAliveEngine {
    session: ActivitySession,
    recorder: Arc<dyn KeepAliveRecorder>,
    window: u32,
    amount_used: u32,
    concluded: bool,
}

impl KeepAliveEngine {
    pub fn new(session: ActivitySession, recorder: Arc<dyn KeepAliveRecorder>) -> Self {
        Self {
            session,
            recorder,
            window: KEEP_ALIVE_WINDOW_SECS,
            amount_used: 0,
            concluded: false,
        }
    }

    pub fn session(&self) -> &ActivitySession {
        &self.session
    }

    pub fn amount_used(&self) -> u32 {
        self.amount_used
    }

    pub fn iterate_loop(&mut self) {
        if self.concluded {
            return;
        }
        self.amount_used += 1;
        if self.amount_used == self.window {
            self.recorder.add_ten_sec_to_end_time(&self.session);
            self.amount_used = 0;
        }
    }

    /// Returns the unused remainder of the current window. Only the first call
    /// has an effect.
    pub fn conclude(&mut self) {
        if self.concluded {
            return;
        }
        self.concluded = true;
        let remainder = self.window - self.amount_used;
        self.recorder.deduct_duration(remainder, &self.session);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ProgramSession;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        AddTen(String),
        Deduct(u32, String),
    }

    #[derive(Default)]
    pub(crate) struct RecordingRecorder {
        pub(crate) calls: Mutex<Vec<Call>>,
    }

    impl RecordingRecorder {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl KeepAliveRecorder for RecordingRecorder {
        fn add_ten_sec_to_end_time(&self, session: &ActivitySession) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::AddTen(session.name().to_string()));
        }

        fn deduct_duration(&self, seconds: u32, session: &ActivitySession) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Deduct(seconds, session.name().to_string()));
        }
    }

    pub(crate) fn session(name: &str) -> ActivitySession {
        ActivitySession::Program(ProgramSession {
            exe_path: format!("/opt/{name}"),
            process_name: name.to_string(),
            window_title: name.to_string(),
            detail: String::new(),
            start_time: chrono_tz::UTC.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            productive: false,
        })
    }

    #[test]
    fn amount_used_counts_iterations_below_the_window() {
        let recorder = Arc::new(RecordingRecorder::default());
        let mut engine = KeepAliveEngine::new(session("editor"), recorder.clone());

        for _ in 0..7 {
            engine.iterate_loop();
        }

        assert_eq!(engine.amount_used(), 7);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn full_window_pushes_once_and_resets() {
        let recorder = Arc::new(RecordingRecorder::default());
        let mut engine = KeepAliveEngine::new(session("editor"), recorder.clone());

        for _ in 0..KEEP_ALIVE_WINDOW_SECS {
            engine.iterate_loop();
        }

        assert_eq!(engine.amount_used(), 0);
        assert_eq!(recorder.calls(), vec![Call::AddTen("editor".into())]);
    }

    #[test]
    fn sixty_three_iterations_push_six_windows_and_deduct_seven() {
        let recorder = Arc::new(RecordingRecorder::default());
        let mut engine = KeepAliveEngine::new(session("editor"), recorder.clone());

        for _ in 0..63 {
            engine.iterate_loop();
        }
        engine.conclude();

        let calls = recorder.calls();
        let pushes = calls.iter().filter(|c| matches!(c, Call::AddTen(_))).count();
        assert_eq!(pushes, 6);
        assert_eq!(calls.last(), Some(&Call::Deduct(7, "editor".into())));

        // Initial optimistic window plus pushes minus remainder.
        let net = KEEP_ALIVE_WINDOW_SECS as i64 + pushes as i64 * 10 - 7;
        assert_eq!(net, 63);
    }

    #[test]
    fn zero_iteration_conclude_returns_the_whole_window() {
        let recorder = Arc::new(RecordingRecorder::default());
        let mut engine = KeepAliveEngine::new(session("editor"), recorder.clone());

        engine.conclude();
        engine.conclude();

        assert_eq!(recorder.calls(), vec![Call::Deduct(10, "editor".into())]);
    }
}
