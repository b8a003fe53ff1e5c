//! Row shapes of the per-session log tables and the daily summary tables.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Identity, LogKind};

/// One row of `program_summary_logs` / `domain_summary_logs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub id: i64,
    pub identity: Identity,
    pub detail: String,
    pub productive: bool,
    pub hours_spent: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_in_sec: Option<f64>,
    pub gathering_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionLog {
    pub fn kind(&self) -> LogKind {
        self.identity.kind()
    }

    pub fn is_finalized(&self) -> bool {
        self.duration_in_sec.is_some()
    }
}

/// One row of `daily_program_summaries` / `daily_chrome_summaries`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub id: i64,
    pub identity: Identity,
    pub hours_spent: f64,
    pub gathering_date: DateTime<Utc>,
}
