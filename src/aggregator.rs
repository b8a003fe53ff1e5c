//! Coalesces bursty timestamped events into `{start, end, count}` intervals.
//!
//! Timestamps are UNIX seconds as floats. Per source they must never move
//! backwards past the latest end seen, including ends already flushed.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregation {
    pub start: f64,
    pub end: f64,
    pub count: u32,
}

impl Aggregation {
    fn seeded(ts: f64) -> Self {
        Self {
            start: ts,
            end: ts,
            count: 1,
        }
    }
}

pub type CompletionCallback = Box<dyn FnMut(&Aggregation) + Send>;

pub struct EventAggregator {
    timeout_secs: f64,
    current: Option<Aggregation>,
    /// End of the last completed aggregation; survives `force_complete`.
    last_end: Option<f64>,
    callback: Option<CompletionCallback>,
}

impl EventAggregator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout_secs: timeout.as_secs_f64(),
            current: None,
            last_end: None,
            callback: None,
        }
    }

    /// Registers the single completion callback, replacing any earlier one.
    pub fn set_callback(&mut self, callback: CompletionCallback) {
        self.callback = Some(callback);
    }

    pub fn current(&self) -> Option<&Aggregation> {
        self.current.as_ref()
    }

    /// Feeds one event. Returns the interval it closed, if any.
    pub fn add_event(&mut self, ts: f64) -> Result<Option<Aggregation>> {
        if !ts.is_finite() {
            return Err(TrackerError::InvalidTimestamp(format!("{ts} is not a finite number")).into());
        }

        let Some(current) = self.current.as_mut() else {
            if let Some(last_end) = self.last_end.filter(|end| ts < *end) {
                return Err(TrackerError::InvalidTimestamp(format!(
                    "{ts} is earlier than the last completed aggregation end {last_end}"
                ))
                .into());
            }
            self.current = Some(Aggregation::seeded(ts));
            return Ok(None);
        };

        if ts < current.end {
            return Err(TrackerError::InvalidTimestamp(format!(
                "{ts} is earlier than the current aggregation end {}",
                current.end
            ))
            .into());
        }

        if ts - current.end <= self.timeout_secs {
            current.end = ts;
            current.count += 1;
            return Ok(None);
        }

        let completed = std::mem::replace(current, Aggregation::seeded(ts));
        self.notify(&completed);
        Ok(Some(completed))
    }

    /// Flushes the open aggregation, if there is one.
    pub fn force_complete(&mut self) -> Option<Aggregation> {
        let completed = self.current.take()?;
        self.notify(&completed);
        Some(completed)
    }

    fn notify(&mut self, completed: &Aggregation) {
        self.last_end = Some(completed.end);
        if let Some(callback) = self.callback.as_mut() {
            callback(completed);
        }
    }
}

/// Reads a bus timestamp. Nulls, strings and other non-numbers are invalid.
pub fn parse_timestamp(value: &serde_json::Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        TrackerError::InvalidTimestamp(format!("expected UNIX seconds, got {value}")).into()
    })
}

pub fn unix_to_utc(ts: f64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros((ts * 1_000_000.0).round() as i64)
        .ok_or_else(|| TrackerError::InvalidTimestamp(format!("{ts} is out of range")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_kind;
    use std::sync::{Arc, Mutex};

    fn invalid(err: &anyhow::Error) -> bool {
        is_kind(err, |e| matches!(e, TrackerError::InvalidTimestamp(_)))
    }

    #[test]
    fn first_event_opens_an_aggregation() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        assert_eq!(agg.add_event(100.0).unwrap(), None);
        assert_eq!(
            agg.current(),
            Some(&Aggregation {
                start: 100.0,
                end: 100.0,
                count: 1
            })
        );
    }

    #[test]
    fn events_within_timeout_extend_the_current_window() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        agg.add_event(100.0).unwrap();
        agg.add_event(100.5).unwrap();
        agg.add_event(101.5).unwrap();

        let current = agg.current().unwrap();
        assert_eq!(current.end, 101.5);
        assert_eq!(current.count, 3);
    }

    #[test]
    fn gap_beyond_timeout_completes_and_reseeds() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut agg = EventAggregator::new(Duration::from_millis(100));
        agg.set_callback(Box::new(move |a| sink.lock().unwrap().push(*a)));

        agg.add_event(10.0).unwrap();
        agg.add_event(10.05).unwrap();
        let completed = agg.add_event(12.0).unwrap().unwrap();

        assert_eq!(completed.start, 10.0);
        assert_eq!(completed.end, 10.05);
        assert_eq!(completed.count, 2);
        assert_eq!(agg.current().unwrap().start, 12.0);
        assert_eq!(seen.lock().unwrap().as_slice(), &[completed]);
    }

    #[test]
    fn out_of_order_event_is_rejected_without_state_change() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        agg.add_event(100.0).unwrap();

        let err = agg.add_event(99.5).unwrap_err();

        assert!(invalid(&err));
        assert_eq!(
            agg.current(),
            Some(&Aggregation {
                start: 100.0,
                end: 100.0,
                count: 1
            })
        );
    }

    #[test]
    fn non_finite_and_non_numeric_inputs_are_rejected() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        assert!(invalid(&agg.add_event(f64::NAN).unwrap_err()));
        assert!(invalid(&parse_timestamp(&serde_json::Value::Null).unwrap_err()));
        assert!(invalid(&parse_timestamp(&serde_json::json!("soon")).unwrap_err()));
        assert_eq!(parse_timestamp(&serde_json::json!(12.5)).unwrap(), 12.5);
        assert!(agg.current().is_none());
    }

    #[test]
    fn force_complete_flushes_once() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        agg.add_event(5.0).unwrap();
        agg.add_event(5.2).unwrap();

        let flushed = agg.force_complete().unwrap();
        assert_eq!(flushed.count, 2);
        assert!(agg.force_complete().is_none());
    }

    #[test]
    fn flushed_end_still_bounds_the_next_event() {
        let mut agg = EventAggregator::new(Duration::from_millis(1000));
        agg.add_event(100.0).unwrap();
        agg.add_event(100.5).unwrap();
        agg.force_complete().unwrap();

        let err = agg.add_event(50.0).unwrap_err();
        assert!(invalid(&err));
        assert!(agg.current().is_none());

        agg.add_event(100.5).unwrap();
        assert_eq!(agg.current().unwrap().start, 100.5);
    }

    #[test]
    fn completed_windows_never_overlap() {
        let mut agg = EventAggregator::new(Duration::from_millis(100));
        let mut completed = Vec::new();
        for ts in [1.0, 1.05, 1.1, 2.0, 2.02, 3.5, 3.55, 3.6, 9.0] {
            if let Some(done) = agg.add_event(ts).unwrap() {
                completed.push(done);
            }
        }
        completed.extend(agg.force_complete());

        assert_eq!(completed.len(), 4);
        for pair in completed.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }
}
