//! Topic management
//!
//! A [`TopicCatalog`] is the fixed set of topic names clients may subscribe
//! to. A [`Topic`] holds the subscribers of one of them, keyed by identity so
//! that an identity appears at most once per topic.
//!
//! Callers must synchronize access to `Topic` (the registry lock does).

use std::collections::HashMap;

use crate::client::{SessionId, Subscriber};

/// The enumerated set of valid topics, in the order they were configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCatalog {
    names: Vec<String>,
}

impl TopicCatalog {
    /// Builds a catalog; blank and repeated names are dropped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if !name.is_empty() && !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self { names: unique }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.names.iter().any(|name| name == topic)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    subscribers: HashMap<String, Subscriber>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    /// Add a subscriber. Returns `false`, leaving the topic untouched, when
    /// the identity is already subscribed.
    pub fn subscribe(&mut self, subscriber: Subscriber) -> bool {
        if self.subscribers.contains_key(&subscriber.identity) {
            return false;
        }
        self.subscribers
            .insert(subscriber.identity.clone(), subscriber);
        true
    }

    /// Remove the subscription held by `identity`.
    pub fn unsubscribe(&mut self, identity: &str) -> Option<Subscriber> {
        self.subscribers.remove(identity)
    }

    /// Remove every subscription owned by `session`.
    pub fn remove_session(&mut self, session: SessionId) -> usize {
        let before = self.subscribers.len();
        self.subscribers.retain(|_, sub| sub.session != session);
        before - self.subscribers.len()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.subscribers.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Copies the current subscribers out of the topic.
    pub fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers.values().cloned().collect()
    }
}
