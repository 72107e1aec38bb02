//! Subscription registry
//!
//! The registry is the only state shared between sessions and the
//! dispatcher. It owns two tables behind a single `RwLock`:
//!
//! - the identity set, enforcing one live session per identity
//! - the per-topic subscriber tables, enforcing one entry per identity
//!
//! Every method takes the lock for the duration of one synchronous call and
//! never across an `.await`. `fanout` copies the subscribers out under a read
//! lock so delivery happens with the lock released.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::broker::topic::{Topic, TopicCatalog};
use crate::client::{SessionId, Subscriber};
use crate::utils::error::ValidationError;

#[derive(Debug, Default)]
struct RegistryState {
    identities: HashSet<String>,
    topics: HashMap<String, Topic>,
}

#[derive(Debug)]
pub struct SubscriptionRegistry {
    catalog: TopicCatalog,
    state: RwLock<RegistryState>,
}

/// Point-in-time copy of a topic's subscribers.
pub type Fanout = std::vec::IntoIter<Subscriber>;

impl SubscriptionRegistry {
    pub fn new(catalog: TopicCatalog) -> Self {
        let topics = catalog
            .names()
            .iter()
            .map(|name| (name.clone(), Topic::new(name)))
            .collect();

        Self {
            catalog,
            state: RwLock::new(RegistryState {
                identities: HashSet::new(),
                topics,
            }),
        }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    // A panic while holding the lock cannot leave the tables half-updated:
    // every mutation is a single insert/remove/retain.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `identity`. Returns `false` if another session holds it.
    pub fn register_identity(&self, identity: &str) -> bool {
        self.write().identities.insert(identity.to_string())
    }

    /// Gives `identity` back. Releasing an unknown identity is a no-op.
    pub fn release_identity(&self, identity: &str) {
        self.write().identities.remove(identity);
    }

    pub fn is_registered(&self, identity: &str) -> bool {
        self.read().identities.contains(identity)
    }

    pub fn registered_count(&self) -> usize {
        self.read().identities.len()
    }

    /// Adds `subscriber` to `topic`.
    pub fn subscribe(&self, topic: &str, subscriber: Subscriber) -> Result<(), ValidationError> {
        let mut state = self.write();
        let Some(entry) = state.topics.get_mut(topic) else {
            return Err(ValidationError::InvalidTopic {
                topic: topic.to_string(),
                valid: self.catalog.names().to_vec(),
            });
        };

        if entry.subscribe(subscriber) {
            Ok(())
        } else {
            Err(ValidationError::DuplicateSubscription(topic.to_string()))
        }
    }

    /// Removes the subscription `identity` holds on `topic`.
    pub fn unsubscribe(&self, topic: &str, identity: &str) -> Result<(), ValidationError> {
        let mut state = self.write();
        let Some(entry) = state.topics.get_mut(topic) else {
            return Err(ValidationError::InvalidTopic {
                topic: topic.to_string(),
                valid: self.catalog.names().to_vec(),
            });
        };

        entry
            .unsubscribe(identity)
            .map(|_| ())
            .ok_or_else(|| ValidationError::NotSubscribed(topic.to_string()))
    }

    /// Removes every entry owned by `session`, across all topics.
    pub fn unsubscribe_all(&self, session: SessionId) -> usize {
        self.write()
            .topics
            .values_mut()
            .map(|topic| topic.remove_session(session))
            .sum()
    }

    /// Snapshot of the current subscribers of `topic`. Unknown topics have
    /// no subscribers.
    pub fn fanout(&self, topic: &str) -> Fanout {
        self.read()
            .topics
            .get(topic)
            .map(Topic::snapshot)
            .unwrap_or_default()
            .into_iter()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.read().topics.get(topic).map_or(0, Topic::len)
    }

    pub fn is_subscribed(&self, topic: &str, identity: &str) -> bool {
        self.read()
            .topics
            .get(topic)
            .is_some_and(|t| t.contains(identity))
    }

    /// Topics `identity` is currently subscribed to, in catalog order.
    pub fn topics_of(&self, identity: &str) -> Vec<String> {
        let state = self.read();
        self.catalog
            .names()
            .iter()
            .filter(|name| state.topics.get(*name).is_some_and(|t| t.contains(identity)))
            .cloned()
            .collect()
    }
}
