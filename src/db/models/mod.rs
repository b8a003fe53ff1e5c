pub mod session_log;
pub mod status;
pub mod timeline;

pub use session_log::{DailySummary, SessionLog};
pub use status::StatusRecord;
pub use timeline::{PrecomputedTimelineEntry, TimelineEntry};
