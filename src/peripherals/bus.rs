//! In-process peripheral bus: one worker thread owns both trackers and
//! receives raw timestamps over a bounded channel.

use std::{
    collections::HashMap,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};

use crate::error::TrackerError;
use crate::models::PeripheralKind;

use super::tracker::{AggregateSink, PeripheralTracker};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const BUS_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct PeripheralTimeouts {
    pub keyboard: Duration,
    pub mouse: Duration,
}

impl Default for PeripheralTimeouts {
    fn default() -> Self {
        Self {
            keyboard: Duration::from_millis(1000),
            mouse: Duration::from_millis(100),
        }
    }
}

enum BusMessage {
    Event(PeripheralKind, f64),
    Flush(mpsc::SyncSender<()>),
    Shutdown,
}

pub struct PeripheralBus {
    sender: mpsc::SyncSender<BusMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Latest timestamp accepted per source.
    accepted: Mutex<HashMap<PeripheralKind, f64>>,
}

impl PeripheralBus {
    pub fn spawn(timeouts: PeripheralTimeouts, sink: Arc<dyn AggregateSink>) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(BUS_CAPACITY);
        let mut keyboard =
            PeripheralTracker::new(PeripheralKind::Keyboard, timeouts.keyboard, sink.clone());
        let mut mouse = PeripheralTracker::new(PeripheralKind::Mouse, timeouts.mouse, sink);

        let worker = thread::Builder::new()
            .name("peripheral-bus".into())
            .spawn(move || {
                for message in receiver {
                    match message {
                        BusMessage::Event(kind, ts) => {
                            let tracker = match kind {
                                PeripheralKind::Keyboard => &mut keyboard,
                                PeripheralKind::Mouse => &mut mouse,
                            };
                            if let Err(err) = tracker.record_event(ts) {
                                log_warn!("dropped {} event: {err}", kind.as_str());
                            }
                        }
                        BusMessage::Flush(ack) => {
                            keyboard.flush();
                            mouse.flush();
                            let _ = ack.send(());
                        }
                        BusMessage::Shutdown => break,
                    }
                }
                keyboard.flush();
                mouse.flush();
                log_info!("peripheral bus stopped");
            })
            .context("failed to spawn peripheral bus thread")?;

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            accepted: Mutex::new(HashMap::new()),
        })
    }

    /// Never blocks. Non-finite and out-of-order timestamps are refused with
    /// `InvalidTimestamp`; an event arriving while the bus is full is dropped.
    pub fn publish(&self, kind: PeripheralKind, ts: f64) -> Result<()> {
        if !ts.is_finite() {
            return Err(
                TrackerError::InvalidTimestamp(format!("{ts} is not a finite number")).into(),
            );
        }

        let mut accepted = self.accepted.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latest) = accepted.get(&kind).filter(|latest| ts < **latest) {
            return Err(TrackerError::InvalidTimestamp(format!(
                "{} event at {ts} is earlier than {latest}",
                kind.as_str()
            ))
            .into());
        }

        self.sender
            .try_send(BusMessage::Event(kind, ts))
            .map_err(|err| match err {
                mpsc::TrySendError::Full(_) => {
                    anyhow!("peripheral bus is full; dropping {} event", kind.as_str())
                }
                mpsc::TrySendError::Disconnected(_) => anyhow!("peripheral bus is closed"),
            })?;
        accepted.insert(kind, ts);
        Ok(())
    }

    /// Completes any open keyboard and mouse aggregation and waits until
    /// they were handed to the sink.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        self.sender
            .send(BusMessage::Flush(ack_tx))
            .map_err(|_| anyhow!("peripheral bus is closed"))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("peripheral bus stopped before flushing"))
    }

    /// Flushes and joins the worker. Later calls do nothing.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(worker) = worker {
            let _ = self.sender.send(BusMessage::Shutdown);
            if worker.join().is_err() {
                log_warn!("peripheral bus thread panicked");
            }
        }
    }
}

impl Drop for PeripheralBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_kind;
    use crate::peripherals::tracker::tests::CollectingSink;

    #[test]
    fn sources_aggregate_independently() {
        let sink = Arc::new(CollectingSink::default());
        let bus = PeripheralBus::spawn(PeripheralTimeouts::default(), sink.clone()).unwrap();

        bus.publish(PeripheralKind::Keyboard, 10.0).unwrap();
        bus.publish(PeripheralKind::Mouse, 10.05).unwrap();
        bus.publish(PeripheralKind::Keyboard, 10.5).unwrap();
        bus.publish(PeripheralKind::Mouse, 10.1).unwrap();
        bus.publish(PeripheralKind::Mouse, 11.0).unwrap();
        bus.flush().unwrap();

        let stored = sink.stored();
        let keyboard: Vec<_> = stored
            .iter()
            .filter(|a| a.kind == PeripheralKind::Keyboard)
            .collect();
        let mouse: Vec<_> = stored
            .iter()
            .filter(|a| a.kind == PeripheralKind::Mouse)
            .collect();
        assert_eq!(keyboard.len(), 1);
        assert_eq!(keyboard[0].count, 2);
        assert_eq!(mouse.len(), 2);
        assert_eq!(mouse[0].count, 2);
        assert_eq!(mouse[1].count, 1);
    }

    #[test]
    fn out_of_order_events_are_refused_to_the_publisher() {
        let sink = Arc::new(CollectingSink::default());
        let bus = PeripheralBus::spawn(PeripheralTimeouts::default(), sink.clone()).unwrap();

        bus.publish(PeripheralKind::Keyboard, 50.0).unwrap();
        let err = bus.publish(PeripheralKind::Keyboard, 49.0).unwrap_err();
        assert!(is_kind(&err, |e| matches!(e, TrackerError::InvalidTimestamp(_))));
        assert!(bus.publish(PeripheralKind::Keyboard, f64::INFINITY).is_err());
        // Sources are ordered independently.
        bus.publish(PeripheralKind::Mouse, 49.0).unwrap();
        bus.publish(PeripheralKind::Keyboard, 50.2).unwrap();
        bus.flush().unwrap();

        // Still refused once the earlier burst has been flushed.
        assert!(bus.publish(PeripheralKind::Keyboard, 50.1).is_err());
        bus.shutdown();

        let stored = sink.stored();
        let keyboard: Vec<_> = stored
            .iter()
            .filter(|a| a.kind == PeripheralKind::Keyboard)
            .collect();
        assert_eq!(keyboard.len(), 1);
        assert_eq!(keyboard[0].count, 2);
        assert!(bus.publish(PeripheralKind::Mouse, 60.0).is_err());
    }
}
