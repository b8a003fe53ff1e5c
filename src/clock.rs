use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::{Duration as StdDuration, Instant},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::TrackerError;

/// Time source for the accounting engine. Durations come from `monotonic`,
/// stored instants from `now_utc`.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
    fn monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Hands out pre-seeded instants in order and counts how often it was asked.
/// Once the seeds run out the last one keeps being returned.
pub struct MockClock {
    seeds: Mutex<VecDeque<DateTime<Utc>>>,
    last: Mutex<Option<DateTime<Utc>>>,
    first: Option<DateTime<Utc>>,
    base: Instant,
    calls: AtomicUsize,
}

impl MockClock {
    pub fn new(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        let seeds: VecDeque<_> = times.into_iter().collect();
        let first = seeds.front().copied();
        Self {
            seeds: Mutex::new(seeds),
            last: Mutex::new(None),
            first,
            base: Instant::now(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> DateTime<Utc> {
        let mut seeds = self.seeds.lock().unwrap_or_else(|p| p.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(next) = seeds.pop_front() {
            *last = Some(next);
        }
        last.or(self.first).unwrap_or_else(Utc::now)
    }
}

impl Clock for MockClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }

    fn monotonic(&self) -> Instant {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.next();
        let offset = self
            .first
            .map(|first| (now - first).to_std().unwrap_or(StdDuration::ZERO))
            .unwrap_or(StdDuration::ZERO);
        self.base + offset
    }
}

/// The user's wall-clock view: UTC shifted into a named IANA zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserLocalTime {
    tz: Tz,
}

impl UserLocalTime {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let tz = name
            .parse::<Tz>()
            .map_err(|err| anyhow!("unknown time zone '{name}': {err}"))?;
        Ok(Self { tz })
    }

    pub fn zone(&self) -> Tz {
        self.tz
    }

    pub fn localize(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn now(&self, clock: &dyn Clock) -> DateTime<Tz> {
        self.localize(clock.now_utc())
    }

    /// Local midnight of the day containing `instant`, expressed in UTC.
    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = self.localize(instant).date_naive();
        let midnight = local_date.and_time(NaiveTime::MIN);
        // Zones that skip midnight on a DST change start the day at the first
        // representable local instant.
        let start = self
            .tz
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
            });
        match start {
            Some(local) => local.with_timezone(&Utc),
            None => instant,
        }
    }

    pub fn days_before(&self, instant: DateTime<Utc>, days: i64) -> DateTime<Utc> {
        self.start_of_day(self.start_of_day(instant) - Duration::days(days) + Duration::hours(12))
    }
}

/// Parses an ISO-8601 instant that must carry an offset. Naive inputs are
/// rejected as `TimezoneUnaware`.
pub fn parse_aware(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").is_ok()
    {
        return Err(TrackerError::TimezoneUnaware(value.to_string()).into());
    }
    Err(anyhow!("invalid datetime '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_kind;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn mock_clock_returns_seeds_in_order_and_counts_calls() {
        let a = utc("2025-03-01T10:00:00Z");
        let b = utc("2025-03-01T10:00:23Z");
        let clock = MockClock::new([a, b]);

        assert_eq!(clock.now_utc(), a);
        assert_eq!(clock.now_utc(), b);
        assert_eq!(clock.now_utc(), b);
        assert_eq!(clock.count(), 3);
    }

    #[test]
    fn mock_monotonic_tracks_seed_offsets() {
        let a = utc("2025-03-01T10:00:00Z");
        let b = utc("2025-03-01T10:00:05Z");
        let clock = MockClock::new([a, b]);

        let first = clock.monotonic();
        let second = clock.monotonic();
        assert_eq!(second - first, StdDuration::from_secs(5));
    }

    #[test]
    fn start_of_day_uses_local_midnight() {
        let local = UserLocalTime::from_name("America/Los_Angeles").unwrap();
        // 02:00 UTC on the 2nd is still the 1st in Los Angeles (UTC-8).
        let instant = utc("2025-01-02T02:00:00Z");
        assert_eq!(local.start_of_day(instant), utc("2025-01-01T08:00:00Z"));
    }

    #[test]
    fn days_before_steps_back_whole_local_days() {
        let local = UserLocalTime::from_name("UTC").unwrap();
        let instant = utc("2025-01-10T15:30:00Z");
        assert_eq!(local.days_before(instant, 7), utc("2025-01-03T00:00:00Z"));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        assert!(UserLocalTime::from_name("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn parse_aware_rejects_naive_datetimes() {
        let err = parse_aware("2025-01-01T10:00:00").unwrap_err();
        assert!(is_kind(&err, |e| matches!(e, TrackerError::TimezoneUnaware(_))));
        assert_eq!(
            parse_aware("2025-01-01T10:00:00+02:00").unwrap(),
            utc("2025-01-01T08:00:00Z")
        );
    }
}
