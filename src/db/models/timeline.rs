use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::PeripheralKind;

/// A keyboard or mouse interval as served to the dashboard timeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: i64,
    pub group: PeripheralKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_count: u32,
}

impl TimelineEntry {
    pub fn client_facing_id(&self) -> String {
        format!("{}-{}", self.group.id_prefix(), self.id)
    }
}

/// Timeline entry after adjacent intervals of a group were collapsed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedTimelineEntry {
    pub client_facing_id: String,
    pub group: PeripheralKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_count: u32,
}
