//! The `jobs` module is the asynchronous job facility used for side work that
//! must stay off the client-facing path: the simulated notification
//! processing step and outbound email.
//!
//! Callers only see [`JobSubmitter`] and [`JobHandle`]; [`LocalJobPool`] is the
//! in-process implementation.

pub mod mailer;
pub mod pool;

use std::time::Duration;

use tokio::sync::oneshot;

use crate::utils::error::JobError;

pub use mailer::{Email, LogMailer, Mailer, MemoryMailer};
pub use pool::LocalJobPool;

/// A unit of work for the job facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    ProcessNotification { topic: String, message: String },
    SendEmail { to: String, subject: String, body: String },
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ProcessNotification { .. } => "process_notification",
            Job::SendEmail { .. } => "send_email",
        }
    }
}

/// Anything that accepts jobs and hands back a handle to their result.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, job: Job) -> Result<JobHandle, JobError>;
}

/// Pending result of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    result: oneshot::Receiver<Result<String, String>>,
}

impl JobHandle {
    /// Creates a handle together with the sender that completes it.
    pub fn channel() -> (oneshot::Sender<Result<String, String>>, JobHandle) {
        let (tx, rx) = oneshot::channel();
        (tx, JobHandle { result: rx })
    }

    /// Waits for the job at most `timeout`.
    ///
    /// A job whose executor vanished without answering counts as failed.
    pub async fn wait(self, timeout: Duration) -> Result<String, JobError> {
        match tokio::time::timeout(timeout, self.result).await {
            Err(_) => Err(JobError::Timeout { timeout }),
            Ok(Err(_)) => Err(JobError::Failed {
                reason: "job dropped before completion".to_string(),
            }),
            Ok(Ok(Err(reason))) => Err(JobError::Failed { reason }),
            Ok(Ok(Ok(output))) => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests;
