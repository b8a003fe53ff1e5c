use serde::Serialize;

use crate::models::{ActivitySession, ChromeSession, ProgramSession};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ArbiterStatus {
    Empty,
    HoldingProgram,
    HoldingChrome,
}

/// The session that currently owns wall-clock time, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArbiterState {
    #[default]
    Empty,
    HoldingProgram(ProgramSession),
    HoldingChrome(ChromeSession),
}

impl ArbiterState {
    pub fn status(&self) -> ArbiterStatus {
        match self {
            ArbiterState::Empty => ArbiterStatus::Empty,
            ArbiterState::HoldingProgram(_) => ArbiterStatus::HoldingProgram,
            ArbiterState::HoldingChrome(_) => ArbiterStatus::HoldingChrome,
        }
    }

    pub fn session(&self) -> Option<ActivitySession> {
        match self {
            ArbiterState::Empty => None,
            ArbiterState::HoldingProgram(p) => Some(ActivitySession::Program(p.clone())),
            ArbiterState::HoldingChrome(c) => Some(ActivitySession::Chrome(c.clone())),
        }
    }

    /// Moves the held session out, leaving `Empty` behind.
    pub fn take(&mut self) -> Option<ActivitySession> {
        match std::mem::take(self) {
            ArbiterState::Empty => None,
            ArbiterState::HoldingProgram(p) => Some(ActivitySession::Program(p)),
            ArbiterState::HoldingChrome(c) => Some(ActivitySession::Chrome(c)),
        }
    }
}

impl From<ActivitySession> for ArbiterState {
    fn from(session: ActivitySession) -> Self {
        match session {
            ActivitySession::Program(p) => ArbiterState::HoldingProgram(p),
            ActivitySession::Chrome(c) => ArbiterState::HoldingChrome(c),
        }
    }
}
