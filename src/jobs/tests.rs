use super::{Job, JobHandle, JobSubmitter, LocalJobPool, MemoryMailer};
use crate::utils::error::JobError;
use std::sync::Arc;
use std::time::Duration;

fn pool(delay_ms: u64, mailer: Arc<MemoryMailer>) -> LocalJobPool {
    LocalJobPool::new(2, Duration::from_millis(delay_ms), mailer)
}

#[tokio::test]
async fn test_process_notification_job() {
    let pool = pool(10, Arc::new(MemoryMailer::default()));
    let handle = pool
        .submit(Job::ProcessNotification {
            topic: "Yoga".into(),
            message: "class-moved".into(),
        })
        .unwrap();

    let output = handle.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(output, "Notification processed for topic 'Yoga': class-moved");
}

#[tokio::test]
async fn test_wait_times_out() {
    let pool = pool(500, Arc::new(MemoryMailer::default()));
    let handle = pool
        .submit(Job::ProcessNotification {
            topic: "Yoga".into(),
            message: "slow".into(),
        })
        .unwrap();

    let err = handle.wait(Duration::from_millis(20)).await.unwrap_err();
    assert_eq!(
        err,
        JobError::Timeout {
            timeout: Duration::from_millis(20)
        }
    );
}

#[tokio::test]
async fn test_send_email_job_uses_mailer() {
    let mailer = Arc::new(MemoryMailer::default());
    let pool = pool(0, mailer.clone());
    let handle = pool
        .submit(Job::SendEmail {
            to: "a@x.com".into(),
            subject: "Notificación de Yoga".into(),
            body: "class-moved".into(),
        })
        .unwrap();

    handle.wait(Duration::from_secs(1)).await.unwrap();
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@x.com");
}

#[tokio::test]
async fn test_dropped_job_counts_as_failure() {
    let (tx, handle) = JobHandle::channel();
    drop(tx);
    let err = handle.wait(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, JobError::Failed { .. }));
}

#[tokio::test]
async fn test_failed_job_reports_reason() {
    let (tx, handle) = JobHandle::channel();
    tx.send(Err("smtp down".to_string())).unwrap();
    let err = handle.wait(Duration::from_secs(1)).await.unwrap_err();
    assert_eq!(
        err,
        JobError::Failed {
            reason: "smtp down".to_string()
        }
    );
}

#[test]
fn test_submit_outside_runtime_is_unavailable() {
    let pool = pool(0, Arc::new(MemoryMailer::default()));
    let err = pool
        .submit(Job::ProcessNotification {
            topic: "Yoga".into(),
            message: "x".into(),
        })
        .unwrap_err();
    assert_eq!(err, JobError::Unavailable);
}
