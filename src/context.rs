use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock, UserLocalTime};

/// Clock and user time zone handed to every component at construction.
#[derive(Clone)]
pub struct Context {
    pub clock: Arc<dyn Clock>,
    pub local: UserLocalTime,
}

impl Context {
    pub fn new(clock: Arc<dyn Clock>, local: UserLocalTime) -> Self {
        Self { clock, local }
    }

    pub fn system(local: UserLocalTime) -> Self {
        Self::new(Arc::new(SystemClock), local)
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    /// Gathering date (local start of day, in UTC) of `instant`.
    pub fn day_of(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.local.start_of_day(instant)
    }
}
