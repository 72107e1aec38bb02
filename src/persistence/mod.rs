//! The `persistence` module records every successful subscription durably.
//!
//! `sled_store` is the append-only store; `worker` runs it on its own thread
//! behind a fire-and-forget ingestion queue.

pub mod sled_store;
pub mod worker;

pub use sled_store::{StoredSubscription, SubscriptionRecord, SubscriptionStore};
pub use worker::{PersistenceCommand, PersistenceQueue, PersistenceWorker, WorkerStats};
