//! Durable subscription log backed by `sled`.
//!
//! Records live in the `subscriptions` tree keyed by a big-endian id from
//! `Db::generate_id`, so iteration yields them in insertion order. The store
//! is append-only; nothing in the broker reads it back.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::utils::error::PersistenceError;

const RECORDS_TREE: &str = "subscriptions";
const SCHEMA_KEY: &[u8] = b"schema_version";
const SCHEMA_VERSION: u32 = 1;

/// One successful subscription, as handed to the persistence worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub identity: String,
    pub topic: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
}

impl SubscriptionRecord {
    /// A record stamped with the current time.
    pub fn now(identity: &str, topic: &str) -> Self {
        Self {
            identity: identity.to_string(),
            topic: topic.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// A record as stored, with its assigned id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredSubscription {
    pub id: u64,
    pub identity: String,
    pub topic: String,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct SubscriptionStore {
    db: Db,
    records: Tree,
}

impl SubscriptionStore {
    /// Open or create the store at `path` and initialize its schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db = sled::open(path)?;
        Self::init(db)
    }

    /// A store that is deleted when dropped.
    pub fn temporary() -> Result<Self, PersistenceError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::init(db)
    }

    fn init(db: Db) -> Result<Self, PersistenceError> {
        let records = db.open_tree(RECORDS_TREE)?;
        if db.get(SCHEMA_KEY)?.is_none() {
            db.insert(SCHEMA_KEY, SCHEMA_VERSION.to_be_bytes().to_vec())?;
        }
        Ok(Self { db, records })
    }

    pub fn schema_version(&self) -> Result<Option<u32>, PersistenceError> {
        Ok(self.db.get(SCHEMA_KEY)?.and_then(|raw| {
            let bytes: [u8; 4] = raw[..].try_into().ok()?;
            Some(u32::from_be_bytes(bytes))
        }))
    }

    /// Append `record`, returning its id.
    pub fn insert(&self, record: &SubscriptionRecord) -> Result<u64, PersistenceError> {
        let id = self.db.generate_id()?;
        let stored = StoredSubscription {
            id,
            identity: record.identity.clone(),
            topic: record.topic.clone(),
            timestamp: record.timestamp,
        };
        let serialized = serde_json::to_vec(&stored)?;
        self.records.insert(id.to_be_bytes(), serialized)?;
        Ok(id)
    }

    /// Every stored record in insertion order. Unreadable entries are skipped.
    pub fn load_records(&self) -> Vec<StoredSubscription> {
        self.records
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(_, val)| serde_json::from_slice(&val).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
