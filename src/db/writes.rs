use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{Identity, PeripheralAggregate, SystemStatus};

use super::repositories::{
    peripherals::insert_aggregate,
    session_logs::{finalize_log, insert_log, shift_log, NewLog},
    summaries::adjust_summary,
    system_status::insert_status,
};

/// One storage mutation. Values are immutable once submitted to a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    OpenLog {
        identity: Identity,
        detail: String,
        productive: bool,
        start_time: DateTime<Utc>,
        initial_secs: f64,
        gathering_date: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },
    /// Moves end-time and hours of the `identity` log starting at `start_time`.
    ShiftLog {
        identity: Identity,
        start_time: DateTime<Utc>,
        seconds: f64,
    },
    FinalizeLog {
        identity: Identity,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_secs: f64,
    },
    /// Upsert-add on the `(identity, day)` summary row.
    AdjustSummary {
        identity: Identity,
        gathering_date: DateTime<Utc>,
        seconds: f64,
    },
    InsertAggregate(PeripheralAggregate),
    RecordStatus {
        status: SystemStatus,
        created_at: DateTime<Utc>,
    },
}

impl StoreWrite {
    pub fn label(&self) -> &'static str {
        match self {
            StoreWrite::OpenLog { .. } => "open_log",
            StoreWrite::ShiftLog { .. } => "shift_log",
            StoreWrite::FinalizeLog { .. } => "finalize_log",
            StoreWrite::AdjustSummary { .. } => "adjust_summary",
            StoreWrite::InsertAggregate(_) => "insert_aggregate",
            StoreWrite::RecordStatus { .. } => "record_status",
        }
    }
}

pub fn apply_write(conn: &Connection, write: &StoreWrite) -> Result<()> {
    match write {
        StoreWrite::OpenLog {
            identity,
            detail,
            productive,
            start_time,
            initial_secs,
            gathering_date,
            created_at,
        } => insert_log(
            conn,
            NewLog {
                identity,
                detail,
                productive: *productive,
                start_time: *start_time,
                initial_secs: *initial_secs,
                gathering_date: *gathering_date,
                created_at: *created_at,
            },
        ),
        StoreWrite::ShiftLog {
            identity,
            start_time,
            seconds,
        } => shift_log(conn, identity, *start_time, *seconds),
        StoreWrite::FinalizeLog {
            identity,
            start_time,
            end_time,
            duration_secs,
        } => finalize_log(conn, identity, *start_time, *end_time, *duration_secs),
        StoreWrite::AdjustSummary {
            identity,
            gathering_date,
            seconds,
        } => adjust_summary(conn, identity, *gathering_date, *seconds),
        StoreWrite::InsertAggregate(aggregate) => insert_aggregate(conn, aggregate),
        StoreWrite::RecordStatus { status, created_at } => {
            insert_status(conn, *status, *created_at)
        }
    }
}
