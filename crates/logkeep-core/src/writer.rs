//! Background writer that owns a store.
//!
//! Callers hand records to [`LogWriter::enqueue`], which never blocks and
//! never fails. A single worker thread drains the queue and appends each
//! record to the store in submission order. Store failures, and panics
//! raised by the store, cost exactly the record being written. They are
//! counted and the worker moves on to the next record.
//!
//! # Backpressure
//!
//! The queue is bounded by [`WriterConfig::queue_capacity`]. When it is full
//! the newest record is dropped and counted in [`WriterStats::dropped`].

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::record::LogRecord;
use crate::storage::{LogStore, MessageStore};
use crate::INTERNAL_TARGET;

/// Default number of records that may wait for the worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum queued records before new ones are dropped (minimum 1)
    pub queue_capacity: usize,
    /// Name of the worker thread
    pub thread_name: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name: "logkeep-writer".to_string(),
        }
    }
}

impl WriterConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Counters describing what happened to enqueued records.
#[derive(Debug, Default)]
pub struct WriterStats {
    accepted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl WriterStats {
    /// Records accepted into the queue
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Records appended to the store
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records the store rejected
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Records refused because the queue was full or the worker was gone
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Commands processed by the worker thread.
enum WriterCommand {
    Append(LogRecord),
    /// Acknowledge once everything queued before it has been handled.
    Flush(SyncSender<()>),
    Shutdown,
}

struct WriterShared {
    tx: SyncSender<WriterCommand>,
    stats: Arc<WriterStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WriterShared {
    fn drop(&mut self) {
        // Shutdown queues behind pending records, so they are drained first.
        let _ = self.tx.send(WriterCommand::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Handle to a store's serial writer.
///
/// Cheap to clone; all clones feed the same queue. The worker stops after
/// the last clone is dropped and the queue has drained.
#[derive(Clone)]
pub struct LogWriter {
    shared: Arc<WriterShared>,
}

impl LogWriter {
    /// Open a redb store at `path` and start a writer for it.
    pub fn open(path: impl AsRef<Path>, config: &WriterConfig) -> Result<Self, LogError> {
        let store = LogStore::open(path)?;
        Self::spawn(store, config)
    }

    /// Start a writer bound to `store`.
    pub fn spawn<S: MessageStore>(store: S, config: &WriterConfig) -> Result<Self, LogError> {
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        let stats = Arc::new(WriterStats::default());

        let worker_stats = stats.clone();
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_worker(store, rx, worker_stats))?;

        Ok(Self {
            shared: Arc::new(WriterShared {
                tx,
                stats,
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Submit a record. Returns immediately; never fails.
    pub fn enqueue(&self, record: LogRecord) {
        let stats = &self.shared.stats;
        match self.shared.tx.try_send(WriterCommand::Append(record)) {
            Ok(()) => {
                stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                let dropped = stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!(
                        target: INTERNAL_TARGET,
                        dropped,
                        "log queue full, dropping records"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Block until every record enqueued before this call has been written
    /// or discarded.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.shared.tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.shared.stats
    }
}

fn run_worker<S: MessageStore>(store: S, rx: Receiver<WriterCommand>, stats: Arc<WriterStats>) {
    while let Ok(command) = rx.recv() {
        match command {
            WriterCommand::Append(record) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| store.append(&record)));
                match outcome {
                    Ok(Ok(_)) => {
                        stats.written.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            target: INTERNAL_TARGET,
                            error = %e,
                            label = %record.label,
                            "discarding log record after store failure"
                        );
                    }
                    Err(_) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            target: INTERNAL_TARGET,
                            label = %record.label,
                            "discarding log record after store panic"
                        );
                    }
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            WriterCommand::Shutdown => break,
        }
    }
}
