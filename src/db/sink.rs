use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle, time::Instant};

use crate::error::TrackerError;

use super::{
    connection::Database,
    writes::{apply_write, StoreWrite},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Destination for storage mutations. Both implementations keep submission
/// order per sink.
pub trait WriteSink: Send + Sync {
    fn submit(&self, write: StoreWrite) -> Result<()>;
}

/// Applies every write synchronously before returning. Used on paths that
/// must not lose data, such as power events.
#[derive(Clone)]
pub struct DirectSink {
    db: Database,
}

impl DirectSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl WriteSink for DirectSink {
    fn submit(&self, write: StoreWrite) -> Result<()> {
        self.db
            .execute_blocking(move |conn| apply_write(conn, &write))
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    /// Longest a queued write may wait before being committed.
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub drain_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 30,
            flush_interval: Duration::from_secs(1),
            queue_capacity: 1024,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Queues writes on a bounded channel; a background task commits them in
/// batches of at most `max_batch_size`, one transaction per batch.
pub struct QueuedSink {
    tx: Mutex<Option<mpsc::Sender<StoreWrite>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    drain_timeout: Duration,
}

impl QueuedSink {
    pub fn spawn(db: Database, config: BatchConfig, runtime: &Handle) -> Result<Self> {
        if config.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(TrackerError::WayTooLongWait(config.flush_interval).into());
        }
        if config.max_batch_size == 0 || config.queue_capacity == 0 {
            return Err(anyhow!("batch size and queue capacity must be positive"));
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let pending = Arc::new(AtomicUsize::new(0));
        let drain_timeout = config.drain_timeout;
        let task = runtime.spawn(run_batches(db, rx, config, pending.clone()));

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
            pending,
            drain_timeout,
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Closes the queue and waits up to the drain timeout for pending writes.
    /// Whatever is still queued after that is dropped.
    pub async fn shutdown(&self) -> Result<()> {
        let sender = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(sender);

        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(mut task) = task else {
            return Ok(());
        };

        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(_) => {
                log_info!("write queue drained");
                Ok(())
            }
            Err(_) => {
                task.abort();
                let dropped = self.pending();
                log_error!(
                    "write queue drain exceeded {:?}; dropping {} pending writes",
                    self.drain_timeout,
                    dropped
                );
                Err(TrackerError::QueueDrainTimeout {
                    timeout: self.drain_timeout,
                    dropped,
                }
                .into())
            }
        }
    }
}

impl WriteSink for QueuedSink {
    /// Blocks while the queue is full. Must be called from outside the async
    /// runtime (tick thread, peripheral worker, `spawn_blocking`).
    fn submit(&self, write: StoreWrite) -> Result<()> {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("write queue is shut down"))?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.blocking_send(write).map_err(|err| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            anyhow!("write queue closed before accepting {}", err.0.label())
        })
    }
}

async fn run_batches(
    db: Database,
    mut rx: mpsc::Receiver<StoreWrite>,
    config: BatchConfig,
    pending: Arc<AtomicUsize>,
) {
    let mut batch = Vec::with_capacity(config.max_batch_size);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        let deadline = Instant::now() + config.flush_interval;

        while batch.len() < config.max_batch_size {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(write)) => batch.push(write),
                Ok(None) | Err(_) => break,
            }
        }

        let writes = std::mem::take(&mut batch);
        let count = writes.len();
        if let Err(err) = commit_batch(&db, writes).await {
            log_error!("failed to commit batch of {} writes: {err:?}", count);
        }
        pending.fetch_sub(count, Ordering::SeqCst);
    }
}

async fn commit_batch(db: &Database, writes: Vec<StoreWrite>) -> Result<()> {
    db.execute(move |conn| {
        let tx = conn.transaction()?;
        for write in &writes {
            if let Err(err) = apply_write(&tx, write) {
                log_error!("dropping {} write: {err}", write.label());
            }
        }
        tx.commit()?;
        Ok(())
    })
    .await
}
