//! The `broker` module holds the shared subscription state and the
//! notification fan-out.
//!
//! - `topic`: the topic catalog and per-topic subscriber tables.
//! - `registry`: identity uniqueness and subscriptions behind one lock.
//! - `dispatcher`: operator sends, from processing job to delivery.

pub mod dispatcher;
pub mod registry;
pub mod topic;

pub use dispatcher::{DeliverySummary, DispatchOutcome, DispatchReport, Dispatcher};
pub use registry::SubscriptionRegistry;
pub use topic::{Topic, TopicCatalog};

#[cfg(test)]
mod tests;
