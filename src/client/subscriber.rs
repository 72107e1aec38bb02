use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::utils::error::DeliveryError;

/// Unique id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// What the registry keeps for each subscription: a non-owning way to
/// reach a session.
///
/// The session alone writes to its connection; `deliver` only queues text
/// on the session's outbox.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Session that owns the connection.
    pub session: SessionId,

    /// Identity registered by the session.
    pub identity: String,

    /// Side-channel address, bound at registration.
    pub contact: Option<String>,

    outbox: UnboundedSender<String>,
}

impl Subscriber {
    pub fn new(
        session: SessionId,
        identity: impl Into<String>,
        contact: Option<String>,
        outbox: UnboundedSender<String>,
    ) -> Self {
        Self {
            session,
            identity: identity.into(),
            contact,
            outbox,
        }
    }

    /// Queues `text` for the session to write.
    pub fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.outbox
            .send(text.to_string())
            .map_err(|_| DeliveryError::Disconnected {
                identity: self.identity.clone(),
            })
    }

    /// Whether the owning session is still reading its outbox.
    pub fn is_connected(&self) -> bool {
        !self.outbox.is_closed()
    }
}
