use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::error;

use crate::aggregator::{unix_to_utc, Aggregation, EventAggregator};
use crate::db::PeripheralDao;
use crate::models::{PeripheralAggregate, PeripheralKind};

/// Destination for completed keyboard/mouse intervals.
pub trait AggregateSink: Send + Sync {
    fn store(&self, aggregate: PeripheralAggregate) -> Result<()>;
}

impl AggregateSink for PeripheralDao {
    fn store(&self, aggregate: PeripheralAggregate) -> Result<()> {
        self.insert(aggregate)
    }
}

fn to_aggregate(kind: PeripheralKind, aggregation: &Aggregation) -> Result<PeripheralAggregate> {
    Ok(PeripheralAggregate {
        kind,
        start_time: unix_to_utc(aggregation.start)?,
        end_time: unix_to_utc(aggregation.end)?,
        count: aggregation.count,
    })
}

/// Feeds one device's event timestamps into its own aggregator. Runs beside
/// the arbiter, never through it.
pub struct PeripheralTracker {
    kind: PeripheralKind,
    aggregator: EventAggregator,
}

impl PeripheralTracker {
    pub fn new(kind: PeripheralKind, timeout: Duration, sink: Arc<dyn AggregateSink>) -> Self {
        let mut aggregator = EventAggregator::new(timeout);
        aggregator.set_callback(Box::new(move |aggregation| {
            let stored = to_aggregate(kind, aggregation).and_then(|agg| sink.store(agg));
            if let Err(err) = stored {
                error!("failed to store {} aggregate: {err:?}", kind.as_str());
            }
        }));
        Self { kind, aggregator }
    }

    pub fn kind(&self) -> PeripheralKind {
        self.kind
    }

    /// Rejects out-of-order and non-finite timestamps with `InvalidTimestamp`.
    pub fn record_event(&mut self, ts: f64) -> Result<()> {
        self.aggregator.add_event(ts)?;
        Ok(())
    }

    pub fn flush(&mut self) {
        self.aggregator.force_complete();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{is_kind, TrackerError};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct CollectingSink(pub(crate) Mutex<Vec<PeripheralAggregate>>);

    impl CollectingSink {
        pub(crate) fn stored(&self) -> Vec<PeripheralAggregate> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AggregateSink for CollectingSink {
        fn store(&self, aggregate: PeripheralAggregate) -> Result<()> {
            self.0.lock().unwrap().push(aggregate);
            Ok(())
        }
    }

    #[test]
    fn completed_bursts_reach_the_sink_as_utc_intervals() {
        let sink = Arc::new(CollectingSink::default());
        let mut keyboard =
            PeripheralTracker::new(PeripheralKind::Keyboard, Duration::from_secs(1), sink.clone());

        for ts in [1_700_000_000.0, 1_700_000_000.4, 1_700_000_000.9, 1_700_000_005.0] {
            keyboard.record_event(ts).unwrap();
        }
        keyboard.flush();

        let stored = sink.stored();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].count, 3);
        assert_eq!(stored[0].start_time, unix_to_utc(1_700_000_000.0).unwrap());
        assert_eq!(stored[0].end_time, unix_to_utc(1_700_000_000.9).unwrap());
        assert_eq!(stored[1].count, 1);
        assert!(stored.iter().all(|a| a.kind == PeripheralKind::Keyboard));
    }

    #[test]
    fn out_of_order_events_are_surfaced() {
        let sink = Arc::new(CollectingSink::default());
        let mut mouse =
            PeripheralTracker::new(PeripheralKind::Mouse, Duration::from_millis(100), sink.clone());

        mouse.record_event(100.0).unwrap();
        let err = mouse.record_event(99.5).unwrap_err();

        assert!(is_kind(&err, |e| matches!(e, TrackerError::InvalidTimestamp(_))));
        assert!(sink.stored().is_empty());
    }
}
