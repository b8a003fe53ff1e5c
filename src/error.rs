//! Named failure kinds of the accounting engine.
//!
//! Library seams return `anyhow::Result`; these variants travel inside it and
//! callers that care recover them with `downcast_ref::<TrackerError>()`.

use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrackerError {
    /// Peripheral timestamp that is non-numeric, missing, or earlier than the
    /// end of the open aggregation.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("engine container started without an engine installed")]
    MissingEngine,

    /// A log row that should have been opened by `start_session` is gone.
    #[error("no {table} row starts at {start_time}")]
    ImpossibleToGetHere { table: &'static str, start_time: String },

    #[error("datetime '{0}' carries no timezone offset")]
    TimezoneUnaware(String),

    #[error("flush interval {0:?} exceeds the one second ceiling")]
    WayTooLongWait(Duration),

    #[error("queue drain timed out after {timeout:?}; {dropped} writes dropped")]
    QueueDrainTimeout { timeout: Duration, dropped: usize },
}

/// True when `err` wraps the given tracker error kind.
pub fn is_kind(err: &anyhow::Error, matcher: impl Fn(&TrackerError) -> bool) -> bool {
    err.downcast_ref::<TrackerError>().map(matcher).unwrap_or(false)
}
