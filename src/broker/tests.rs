use super::dispatcher::notification_text;
use super::topic::{Topic, TopicCatalog};
use super::{DispatchOutcome, Dispatcher, SubscriptionRegistry};
use crate::client::{SessionId, Subscriber};
use crate::jobs::{Job, JobHandle, JobSubmitter, LocalJobPool, MemoryMailer};
use crate::utils::error::{JobError, ValidationError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn catalog() -> TopicCatalog {
    TopicCatalog::new(["Yoga", "Pilates", "Spinning", "Crossfit", "Natación"])
}

fn registry() -> Arc<SubscriptionRegistry> {
    Arc::new(SubscriptionRegistry::new(catalog()))
}

fn subscriber(identity: &str) -> (Subscriber, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Subscriber::new(SessionId::new(), identity, None, tx), rx)
}

/// Job facility that records submissions and answers them immediately.
#[derive(Default)]
struct RecordingJobs {
    submitted: Mutex<Vec<Job>>,
    fail_processing: bool,
}

impl JobSubmitter for RecordingJobs {
    fn submit(&self, job: Job) -> Result<JobHandle, JobError> {
        let (tx, handle) = JobHandle::channel();
        let result = match &job {
            Job::ProcessNotification { .. } if self.fail_processing => Err("broker down".into()),
            _ => Ok(format!("{} done", job.kind())),
        };
        self.submitted.lock().unwrap().push(job);
        let _ = tx.send(result);
        Ok(handle)
    }
}

/// Job facility whose jobs never finish.
struct StalledJobs {
    pending: Mutex<Vec<tokio::sync::oneshot::Sender<Result<String, String>>>>,
}

impl JobSubmitter for StalledJobs {
    fn submit(&self, _job: Job) -> Result<JobHandle, JobError> {
        let (tx, handle) = JobHandle::channel();
        self.pending.lock().unwrap().push(tx);
        Ok(handle)
    }
}

fn dispatcher(registry: Arc<SubscriptionRegistry>, jobs: Arc<dyn JobSubmitter>) -> Dispatcher {
    Dispatcher::new(
        registry,
        jobs,
        Duration::from_millis(200),
        Duration::from_millis(200),
    )
}

#[test]
fn test_catalog_drops_blank_and_repeated_names() {
    let catalog = TopicCatalog::new(["Yoga", " ", "Yoga", "Pilates "]);
    assert_eq!(catalog.names(), ["Yoga", "Pilates"]);
    assert!(catalog.contains("Pilates"));
    assert!(!catalog.contains("Zumba"));
}

#[test]
fn test_topic_rejects_duplicate_identity() {
    let mut topic = Topic::new("Yoga");
    let (first, _rx1) = subscriber("a@x.com");
    let (second, _rx2) = subscriber("a@x.com");

    assert!(topic.subscribe(first));
    assert!(!topic.subscribe(second));
    assert_eq!(topic.len(), 1);
}

#[test]
fn test_topic_remove_session_only_removes_owned_entries() {
    let mut topic = Topic::new("Yoga");
    let (a, _rx_a) = subscriber("a@x.com");
    let (b, _rx_b) = subscriber("b@x.com");
    let session = a.session;
    topic.subscribe(a);
    topic.subscribe(b);

    assert_eq!(topic.remove_session(session), 1);
    assert!(!topic.contains("a@x.com"));
    assert!(topic.contains("b@x.com"));
}

#[test]
fn test_register_identity_is_unique() {
    let registry = registry();
    assert!(registry.register_identity("a@x.com"));
    assert!(!registry.register_identity("a@x.com"));
    assert_eq!(registry.registered_count(), 1);
}

#[test]
fn test_release_identity_allows_reuse_and_is_idempotent() {
    let registry = registry();
    assert!(registry.register_identity("a@x.com"));
    registry.release_identity("a@x.com");
    registry.release_identity("a@x.com");
    assert!(!registry.is_registered("a@x.com"));
    assert!(registry.register_identity("a@x.com"));
}

#[test]
fn test_concurrent_registration_admits_exactly_one() {
    let registry = registry();
    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| registry.register_identity("race@x.com")))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum()
    });
    assert_eq!(winners, 1);
}

#[test]
fn test_subscribe_rejects_duplicate() {
    let registry = registry();
    let (first, _rx1) = subscriber("a@x.com");
    let (second, _rx2) = subscriber("a@x.com");

    registry.subscribe("Yoga", first).unwrap();
    let err = registry.subscribe("Yoga", second).unwrap_err();
    assert_eq!(err, ValidationError::DuplicateSubscription("Yoga".into()));
    assert_eq!(registry.subscriber_count("Yoga"), 1);
}

#[test]
fn test_subscribe_rejects_unknown_topic() {
    let registry = registry();
    let (sub, _rx) = subscriber("a@x.com");

    let err = registry.subscribe("Zumba", sub).unwrap_err();
    match err {
        ValidationError::InvalidTopic { topic, valid } => {
            assert_eq!(topic, "Zumba");
            assert_eq!(valid.len(), 5);
        }
        other => panic!("Expected InvalidTopic, got {other:?}"),
    }
    assert_eq!(registry.subscriber_count("Zumba"), 0);
    assert_eq!(registry.fanout("Zumba").len(), 0);
}

#[test]
fn test_unsubscribe() {
    let registry = registry();
    let (sub, _rx) = subscriber("a@x.com");
    registry.subscribe("Yoga", sub).unwrap();

    registry.unsubscribe("Yoga", "a@x.com").unwrap();
    assert!(!registry.is_subscribed("Yoga", "a@x.com"));
    assert_eq!(
        registry.unsubscribe("Yoga", "a@x.com").unwrap_err(),
        ValidationError::NotSubscribed("Yoga".into())
    );
}

#[test]
fn test_unsubscribe_all_removes_every_topic_of_session() {
    let registry = registry();
    let (tx, _rx) = mpsc::unbounded_channel();
    let session = SessionId::new();
    for topic in ["Yoga", "Pilates", "Spinning"] {
        registry
            .subscribe(topic, Subscriber::new(session, "a@x.com", None, tx.clone()))
            .unwrap();
    }
    let (other, _rx_other) = subscriber("b@x.com");
    registry.subscribe("Yoga", other).unwrap();

    assert_eq!(registry.topics_of("a@x.com"), ["Yoga", "Pilates", "Spinning"]);
    assert_eq!(registry.unsubscribe_all(session), 3);
    assert!(registry.topics_of("a@x.com").is_empty());
    assert_eq!(registry.subscriber_count("Yoga"), 1);
}

#[test]
fn test_fanout_is_a_snapshot() {
    let registry = registry();
    let (a, _rx_a) = subscriber("a@x.com");
    let session = a.session;
    registry.subscribe("Yoga", a).unwrap();

    let snapshot = registry.fanout("Yoga");
    registry.unsubscribe_all(session);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(registry.fanout("Yoga").len(), 0);
}

#[tokio::test]
async fn test_send_delivers_once_to_each_subscriber() {
    let registry = registry();
    let mut receivers = Vec::new();
    for i in 0..3 {
        let (sub, rx) = subscriber(&format!("user{i}@x.com"));
        registry.subscribe("Yoga", sub).unwrap();
        receivers.push(rx);
    }
    let jobs = Arc::new(RecordingJobs::default());
    let dispatcher = dispatcher(registry, jobs.clone());

    let report = dispatcher.send("Yoga", "class-moved").await.unwrap();

    match report.outcome {
        DispatchOutcome::Delivered(summary) => {
            assert_eq!(summary.attempted, 3);
            assert_eq!(summary.delivered, 3);
            assert_eq!(summary.emails_sent, 0);
        }
        other => panic!("Expected Delivered, got {other:?}"),
    }
    for mut rx in receivers {
        assert_eq!(rx.try_recv().unwrap(), "Notificación de Yoga: class-moved");
        assert!(rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn test_send_without_subscribers() {
    let jobs = Arc::new(RecordingJobs::default());
    let dispatcher = dispatcher(registry(), jobs.clone());

    let report = dispatcher.send("Boxeo", "hello").await.unwrap();

    assert_eq!(report.outcome, DispatchOutcome::NoSubscribers);
    // Only the processing job ran.
    assert_eq!(jobs.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_continues_past_disconnected_subscriber() {
    let registry = registry();
    let (gone, gone_rx) = subscriber("gone@x.com");
    let (alive, mut alive_rx) = subscriber("alive@x.com");
    registry.subscribe("Pilates", gone).unwrap();
    registry.subscribe("Pilates", alive).unwrap();
    drop(gone_rx);

    let dispatcher = dispatcher(registry, Arc::new(RecordingJobs::default()));
    let report = dispatcher.send("Pilates", "moved").await.unwrap();

    match report.outcome {
        DispatchOutcome::Delivered(summary) => {
            assert_eq!(summary.attempted, 2);
            assert_eq!(summary.delivered, 1);
            assert_eq!(summary.failed, 1);
        }
        other => panic!("Expected Delivered, got {other:?}"),
    }
    assert_eq!(alive_rx.try_recv().unwrap(), notification_text("Pilates", "moved"));
}

#[tokio::test]
async fn test_send_emails_subscribers_with_contact() {
    let registry = registry();
    let (tx, mut rx) = mpsc::unbounded_channel();
    registry
        .subscribe(
            "Yoga",
            Subscriber::new(SessionId::new(), "a@x.com", Some("a@x.com".into()), tx),
        )
        .unwrap();
    let mailer = Arc::new(MemoryMailer::default());
    let jobs = Arc::new(LocalJobPool::new(2, Duration::ZERO, mailer.clone()));
    let dispatcher = dispatcher(registry, jobs);

    let report = dispatcher.send("Yoga", "class-moved").await.unwrap();

    match report.outcome {
        DispatchOutcome::Delivered(summary) => assert_eq!(summary.emails_sent, 1),
        other => panic!("Expected Delivered, got {other:?}"),
    }
    assert!(rx.try_recv().is_ok());
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Notificación de Yoga");
    assert_eq!(sent[0].body, "class-moved");
}

#[tokio::test]
async fn test_processing_failure_aborts_send() {
    let registry = registry();
    let (sub, mut rx) = subscriber("a@x.com");
    registry.subscribe("Yoga", sub).unwrap();
    let jobs = Arc::new(RecordingJobs {
        fail_processing: true,
        ..Default::default()
    });

    let err = dispatcher(registry, jobs).send("Yoga", "x").await.unwrap_err();

    assert!(matches!(err, JobError::Failed { .. }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_processing_timeout_aborts_send() {
    let registry = registry();
    let (sub, mut rx) = subscriber("a@x.com");
    registry.subscribe("Yoga", sub).unwrap();
    let jobs = Arc::new(StalledJobs {
        pending: Mutex::new(Vec::new()),
    });

    let err = dispatcher(registry, jobs).send("Yoga", "x").await.unwrap_err();

    assert!(matches!(err, JobError::Timeout { .. }));
    assert!(rx.try_recv().is_err());
}
