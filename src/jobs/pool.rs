use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use super::mailer::{Email, Mailer};
use super::{Job, JobHandle, JobSubmitter};
use crate::config::JobSettings;
use crate::utils::error::JobError;

/// In-process job facility: every job runs as a tokio task, at most
/// `workers` of them at a time.
#[derive(Clone)]
pub struct LocalJobPool {
    permits: Arc<Semaphore>,
    processing_delay: Duration,
    mailer: Arc<dyn Mailer>,
}

impl LocalJobPool {
    pub fn new(workers: usize, processing_delay: Duration, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
            processing_delay,
            mailer,
        }
    }

    pub fn from_settings(settings: &JobSettings, mailer: Arc<dyn Mailer>) -> Self {
        Self::new(
            settings.workers,
            Duration::from_millis(settings.processing_delay_ms),
            mailer,
        )
    }

    async fn execute(
        job: Job,
        processing_delay: Duration,
        mailer: Arc<dyn Mailer>,
    ) -> Result<String, String> {
        match job {
            Job::ProcessNotification { topic, message } => {
                tokio::time::sleep(processing_delay).await;
                Ok(format!(
                    "Notification processed for topic '{topic}': {message}"
                ))
            }
            Job::SendEmail { to, subject, body } => {
                let email = Email { to, subject, body };
                // Mail transports block; keep them off the async workers.
                tokio::task::spawn_blocking(move || {
                    mailer.send(&email).map(|_| format!("Email sent to {}", email.to))
                })
                .await
                .map_err(|e| format!("mailer panicked: {e}"))?
            }
        }
    }
}

impl JobSubmitter for LocalJobPool {
    fn submit(&self, job: Job) -> Result<JobHandle, JobError> {
        let runtime = Handle::try_current().map_err(|_| JobError::Unavailable)?;

        let (tx, handle) = JobHandle::channel();
        let permits = self.permits.clone();
        let delay = self.processing_delay;
        let mailer = self.mailer.clone();

        runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = tx.send(Err("job pool closed".to_string()));
                return;
            };
            let kind = job.kind();
            let result = Self::execute(job, delay, mailer).await;
            if let Err(e) = &result {
                tracing::warn!(job = kind, "Job failed: {e}");
            }
            // The waiter may have timed out already.
            let _ = tx.send(result);
        });

        Ok(handle)
    }
}

impl std::fmt::Debug for LocalJobPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalJobPool")
            .field("available", &self.permits.available_permits())
            .field("processing_delay", &self.processing_delay)
            .finish()
    }
}
