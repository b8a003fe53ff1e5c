use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeripheralKind {
    Keyboard,
    Mouse,
}

impl PeripheralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeripheralKind::Keyboard => "KEYBOARD",
            PeripheralKind::Mouse => "MOUSE",
        }
    }

    /// Prefix of the client-facing timeline id (`keyboard-<id>`, `mouse-<id>`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            PeripheralKind::Keyboard => "keyboard",
            PeripheralKind::Mouse => "mouse",
        }
    }
}

/// A burst of keyboard or mouse events condensed into one interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralAggregate {
    pub kind: PeripheralKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub count: u32,
}
