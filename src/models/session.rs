use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Which pair of log/summary tables a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Program,
    Domain,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Program => "program",
            LogKind::Domain => "domain",
        }
    }
}

/// Stable key of a session target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Identity {
    Program {
        exe_path: String,
        process_name: String,
        window_title: String,
    },
    Domain {
        domain: String,
    },
}

impl Identity {
    pub fn kind(&self) -> LogKind {
        match self {
            Identity::Program { .. } => LogKind::Program,
            Identity::Domain { .. } => LogKind::Domain,
        }
    }

    /// Human-readable name: the window title for programs, the domain for tabs.
    pub fn name(&self) -> &str {
        match self {
            Identity::Program { window_title, .. } => window_title,
            Identity::Domain { domain } => domain,
        }
    }

    /// Values bound to the identity columns of the kind's tables, in column order.
    pub fn column_values(&self) -> Vec<&str> {
        match self {
            Identity::Program {
                exe_path,
                process_name,
                window_title,
            } => vec![exe_path.as_str(), process_name.as_str(), window_title.as_str()],
            Identity::Domain { domain } => vec![domain.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSession {
    pub exe_path: String,
    pub process_name: String,
    pub window_title: String,
    /// Window title fragment beyond the program name.
    pub detail: String,
    pub start_time: DateTime<Tz>,
    pub productive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChromeSession {
    pub domain: String,
    /// Tab title.
    pub detail: String,
    pub start_time: DateTime<Tz>,
    pub productive: bool,
}

/// The session currently owning wall-clock time.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivitySession {
    Program(ProgramSession),
    Chrome(ChromeSession),
}

impl ActivitySession {
    pub fn identity(&self) -> Identity {
        match self {
            ActivitySession::Program(p) => Identity::Program {
                exe_path: p.exe_path.clone(),
                process_name: p.process_name.clone(),
                window_title: p.window_title.clone(),
            },
            ActivitySession::Chrome(c) => Identity::Domain {
                domain: c.domain.clone(),
            },
        }
    }

    pub fn kind(&self) -> LogKind {
        match self {
            ActivitySession::Program(_) => LogKind::Program,
            ActivitySession::Chrome(_) => LogKind::Domain,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ActivitySession::Program(p) => &p.window_title,
            ActivitySession::Chrome(c) => &c.domain,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ActivitySession::Program(p) => &p.detail,
            ActivitySession::Chrome(c) => &c.detail,
        }
    }

    pub fn start_time(&self) -> DateTime<Tz> {
        match self {
            ActivitySession::Program(p) => p.start_time,
            ActivitySession::Chrome(c) => c.start_time,
        }
    }

    pub fn start_time_utc(&self) -> DateTime<Utc> {
        self.start_time().with_timezone(&Utc)
    }

    /// Moves the start forward to `floor` when it lies before it. Returns
    /// whether the start changed.
    pub fn start_not_before(&mut self, floor: DateTime<Utc>) -> bool {
        if self.start_time_utc() >= floor {
            return false;
        }
        let start = match self {
            ActivitySession::Program(p) => &mut p.start_time,
            ActivitySession::Chrome(c) => &mut c.start_time,
        };
        *start = floor.with_timezone(&start.timezone());
        true
    }

    /// Same target, same start: a repeated report of one session.
    pub fn is_same_session(&self, other: &ActivitySession) -> bool {
        self.identity() == other.identity() && self.start_time() == other.start_time()
    }

    pub fn productive(&self) -> bool {
        match self {
            ActivitySession::Program(p) => p.productive,
            ActivitySession::Chrome(c) => c.productive,
        }
    }

    /// Closes the session at `end`; the duration is exactly `end - start`.
    pub fn complete(self, end: DateTime<Utc>) -> CompletedSession {
        let start = self.start_time();
        let end_time = end.with_timezone(&start.timezone());
        CompletedSession {
            duration: end_time - start,
            end_time,
            session: self,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedSession {
    pub session: ActivitySession,
    pub end_time: DateTime<Tz>,
    pub duration: Duration,
}

impl CompletedSession {
    pub fn start_time(&self) -> DateTime<Tz> {
        self.session.start_time()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0
    }
}
