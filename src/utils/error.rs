//! The `error` module defines the error types used within `livenotify`.
//!
//! Errors are grouped by who gets to see them:
//!
//! - [`ProtocolError`] and [`ValidationError`] are answered to the offending
//!   client only; the session keeps running.
//! - [`DeliveryError`] is logged per subscriber during a fan-out.
//! - [`JobError`] aborts a single operator `send`.
//! - [`PersistenceError`] stays inside the persistence worker.
//! - [`ServerError`] covers startup failures, the only fatal kind.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// A client line that is not a structured message.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message: expected a JSON object.")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid message: expected a JSON object.")]
    NotAnObject,

    #[error("Invalid message: expected a JSON object.")]
    Encoding {
        #[source]
        source: std::str::Utf8Error,
    },
}

/// A well-formed request that cannot be honoured.
///
/// The `Display` output is the exact line sent back to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Registration rejected: an identity is required.")]
    MissingIdentity,

    #[error("Registration rejected: identity '{0}' is already in use.")]
    IdentityInUse(String),

    #[error("Already registered as '{0}'.")]
    AlreadyRegistered(String),

    #[error("Please register first.")]
    NotRegistered,

    #[error("Subscription rejected: no topic specified.")]
    MissingTopic,

    #[error("Subscription rejected: '{topic}' is not a valid topic. Valid topics: {}.", .valid.join(", "))]
    InvalidTopic { topic: String, valid: Vec<String> },

    #[error("Subscription rejected: already subscribed to '{0}'.")]
    DuplicateSubscription(String),

    #[error("Not subscribed to '{0}'.")]
    NotSubscribed(String),
}

impl ValidationError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::MissingIdentity => "missing_identity",
            ValidationError::IdentityInUse(_) => "identity_in_use",
            ValidationError::AlreadyRegistered(_) => "already_registered",
            ValidationError::NotRegistered => "not_registered",
            ValidationError::MissingTopic => "missing_topic",
            ValidationError::InvalidTopic { .. } => "invalid_topic",
            ValidationError::DuplicateSubscription(_) => "duplicate_subscription",
            ValidationError::NotSubscribed(_) => "not_subscribed",
        }
    }
}

/// Failure to reach one subscriber during a fan-out.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("subscriber '{identity}' disconnected")]
    Disconnected { identity: String },

    #[error("side-channel delivery to '{identity}' failed: {source}")]
    SideChannel {
        identity: String,
        #[source]
        source: JobError,
    },
}

/// Failure of a job submitted to the processing facility.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("job failed: {reason}")]
    Failed { reason: String },

    #[error("job facility unavailable")]
    Unavailable,
}

impl JobError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Timeout { .. } => "job_timeout",
            JobError::Failed { .. } => "job_failed",
            JobError::Unavailable => "job_unavailable",
        }
    }
}

/// Errors raised by the durable subscription store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("persistence queue is closed")]
    QueueClosed,

    #[error("persistence worker stopped before the store was ready")]
    WorkerStopped,
}

/// Startup failures. These are the only errors allowed to stop the process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot open subscription store: {0}")]
    Store(#[from] PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
}
