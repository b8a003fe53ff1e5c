use serde::{Deserialize, Serialize};

/// Power and process lifecycle events, appended to `system_change_log`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    Startup,
    Shutdown,
    CtrlCSignal,
    HotReloadStarted,
    HotReloadConcluded,
    Sleep,
    Wake,
}

impl SystemStatus {
    pub const SHUTDOWN_CLASS: [SystemStatus; 4] = [
        SystemStatus::Shutdown,
        SystemStatus::CtrlCSignal,
        SystemStatus::HotReloadStarted,
        SystemStatus::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Startup => "STARTUP",
            SystemStatus::Shutdown => "SHUTDOWN",
            SystemStatus::CtrlCSignal => "CTRL_C_SIGNAL",
            SystemStatus::HotReloadStarted => "HOT_RELOAD_STARTED",
            SystemStatus::HotReloadConcluded => "HOT_RELOAD_CONCLUDED",
            SystemStatus::Sleep => "SLEEP",
            SystemStatus::Wake => "WAKE",
        }
    }

    /// Statuses that end a power-on interval.
    pub fn is_shutdown_class(&self) -> bool {
        Self::SHUTDOWN_CLASS.contains(self)
    }
}
