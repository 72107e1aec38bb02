//! Persistence worker
//!
//! A dedicated OS thread owns the [`SubscriptionStore`] and drains an
//! ingestion queue, so storage latency never reaches the async runtime that
//! serves clients. Producers hold a cloneable [`PersistenceQueue`] and never
//! wait on the store.
//!
//! Termination is explicit: [`PersistenceWorker::shutdown`] enqueues the
//! `Shutdown` sentinel once, after which the worker drains whatever was
//! queued before it, flushes and exits.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::persistence::sled_store::{SubscriptionRecord, SubscriptionStore};
use crate::utils::error::PersistenceError;

/// Messages on the ingestion queue.
#[derive(Debug)]
pub enum PersistenceCommand {
    Record(SubscriptionRecord),
    /// No more records will follow.
    Shutdown,
}

/// What the worker did before it exited.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub inserted: u64,
    pub failed: u64,
}

/// Producer side of the ingestion queue.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: UnboundedSender<PersistenceCommand>,
    closed: Arc<AtomicBool>,
}

impl PersistenceQueue {
    /// Hands `record` to the worker without waiting for it to be stored.
    pub fn enqueue(&self, record: SubscriptionRecord) -> Result<(), PersistenceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PersistenceError::QueueClosed);
        }
        self.tx
            .send(PersistenceCommand::Record(record))
            .map_err(|_| PersistenceError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct PersistenceWorker {
    queue: PersistenceQueue,
    thread: Mutex<Option<JoinHandle<WorkerStats>>>,
}

impl PersistenceWorker {
    /// Starts a worker thread that opens the store at `path` itself.
    ///
    /// Resolves once the store is open and its schema initialized, or with
    /// the error that prevented it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = std::thread::Builder::new()
            .name("persistence-worker".into())
            .spawn(move || match SubscriptionStore::open(&path) {
                Ok(store) => {
                    let _ = ready_tx.send(Ok(()));
                    run(store, rx)
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    WorkerStats::default()
                }
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self::new(tx, thread)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PersistenceError::WorkerStopped),
        }
    }

    /// Moves an already open `store` onto a new worker thread.
    pub fn spawn(store: SubscriptionStore) -> Result<Self, PersistenceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("persistence-worker".into())
            .spawn(move || run(store, rx))?;
        Ok(Self::new(tx, thread))
    }

    fn new(tx: UnboundedSender<PersistenceCommand>, thread: JoinHandle<WorkerStats>) -> Self {
        Self {
            queue: PersistenceQueue {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            thread: Mutex::new(Some(thread)),
        }
    }

    pub fn queue(&self) -> PersistenceQueue {
        self.queue.clone()
    }

    /// Sends the sentinel and waits for the worker to drain and exit.
    ///
    /// Only the first call does anything; later calls return `None`.
    pub async fn shutdown(&self) -> Option<WorkerStats> {
        if self.queue.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let _ = self.queue.tx.send(PersistenceCommand::Shutdown);

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(_)) => {
                error!("Persistence worker panicked");
                None
            }
            Err(e) => {
                error!("Failed to join persistence worker: {e}");
                None
            }
        }
    }
}

fn run(store: SubscriptionStore, mut rx: UnboundedReceiver<PersistenceCommand>) -> WorkerStats {
    info!("Persistence worker started");
    let mut stats = WorkerStats::default();

    while let Some(command) = rx.blocking_recv() {
        let record = match command {
            PersistenceCommand::Record(record) => record,
            PersistenceCommand::Shutdown => break,
        };
        match store.insert(&record) {
            Ok(id) => {
                stats.inserted += 1;
                debug!(id, identity = %record.identity, topic = %record.topic, "Subscription stored");
            }
            Err(e) => {
                stats.failed += 1;
                error!(identity = %record.identity, topic = %record.topic, "Failed to store subscription: {e}");
            }
        }
    }

    if let Err(e) = store.flush() {
        error!("Failed to flush subscription store: {e}");
    }
    info!(
        inserted = stats.inserted,
        failed = stats.failed,
        "Persistence worker stopped"
    );
    stats
}
