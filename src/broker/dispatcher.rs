//! Notification dispatcher
//!
//! Turns an operator `send <topic> <message>` into deliveries:
//!
//! 1. submit a `ProcessNotification` job and wait for it (bounded); any
//!    failure aborts the send before anything is delivered
//! 2. take a fan-out snapshot of the topic
//! 3. queue the notification on every subscriber's session, and for
//!    subscribers with a contact address submit a `SendEmail` job
//!
//! Per-subscriber failures are logged and counted, never fatal.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::broker::registry::SubscriptionRegistry;
use crate::client::Subscriber;
use crate::config::JobSettings;
use crate::jobs::{Job, JobSubmitter};
use crate::utils::error::{DeliveryError, JobError};

/// Text pushed to subscribers of `topic`.
pub fn notification_text(topic: &str, message: &str) -> String {
    format!("Notificación de {topic}: {message}")
}

/// Counters for one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliverySummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    NoSubscribers,
    Delivered(DeliverySummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub topic: String,
    /// Output of the processing job.
    pub processing: String,
    pub outcome: DispatchOutcome,
}

pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    jobs: Arc<dyn JobSubmitter>,
    processing_timeout: Duration,
    email_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        jobs: Arc<dyn JobSubmitter>,
        processing_timeout: Duration,
        email_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            jobs,
            processing_timeout,
            email_timeout,
        }
    }

    pub fn from_settings(
        registry: Arc<SubscriptionRegistry>,
        jobs: Arc<dyn JobSubmitter>,
        settings: &JobSettings,
    ) -> Self {
        Self::new(
            registry,
            jobs,
            Duration::from_secs(settings.processing_timeout_secs),
            Duration::from_secs(settings.email_timeout_secs),
        )
    }

    /// Sends `message` to every current subscriber of `topic`.
    ///
    /// The topic is not checked against the catalog: sending to a topic
    /// nobody can subscribe to just reports no subscribers.
    pub async fn send(&self, topic: &str, message: &str) -> Result<DispatchReport, JobError> {
        let processing = self
            .jobs
            .submit(Job::ProcessNotification {
                topic: topic.to_string(),
                message: message.to_string(),
            })?
            .wait(self.processing_timeout)
            .await?;
        info!(topic, "Notification processed: {processing}");

        let subscribers = self.registry.fanout(topic);
        if subscribers.as_slice().is_empty() {
            info!(topic, "No subscribers");
            return Ok(DispatchReport {
                topic: topic.to_string(),
                processing,
                outcome: DispatchOutcome::NoSubscribers,
            });
        }

        let text = notification_text(topic, message);
        let mut summary = DeliverySummary::default();
        let mut emails = Vec::new();

        for subscriber in subscribers {
            summary.attempted += 1;
            match subscriber.deliver(&text) {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    warn!(topic, "Delivery failed: {e}");
                    summary.failed += 1;
                }
            }
            if subscriber.contact.is_some() {
                emails.push(self.send_email(subscriber, topic, message));
            }
        }

        for result in join_all(emails).await {
            match result {
                Ok(()) => summary.emails_sent += 1,
                Err(e) => {
                    warn!(topic, "{e}");
                    summary.emails_failed += 1;
                }
            }
        }

        info!(
            topic,
            delivered = summary.delivered,
            failed = summary.failed,
            "Notification sent"
        );

        Ok(DispatchReport {
            topic: topic.to_string(),
            processing,
            outcome: DispatchOutcome::Delivered(summary),
        })
    }

    async fn send_email(
        &self,
        subscriber: Subscriber,
        topic: &str,
        message: &str,
    ) -> Result<(), DeliveryError> {
        let Some(to) = subscriber.contact else {
            return Ok(());
        };
        let job = Job::SendEmail {
            to,
            subject: format!("Notificación de {topic}"),
            body: message.to_string(),
        };

        let side_channel = |source: JobError| DeliveryError::SideChannel {
            identity: subscriber.identity.clone(),
            source,
        };

        self.jobs
            .submit(job)
            .map_err(side_channel)?
            .wait(self.email_timeout)
            .await
            .map(|_| ())
            .map_err(side_channel)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("processing_timeout", &self.processing_timeout)
            .field("email_timeout", &self.email_timeout)
            .finish()
    }
}
