//! Connection session
//!
//! One `Session` per accepted connection. It owns both halves of the stream
//! and is the only writer on it: replies are written inline, notifications
//! arrive through the session's outbox and are written from the same loop.
//!
//! States: `Connected` → `Registering` → `Active` → `Closed`. Rejections never
//! change state, except that the `disconnect` registration policy closes the
//! session after a rejected registration.
//!
//! Registry cleanup lives in [`SessionGuard`], which the session owns. It runs
//! once, on whichever comes first: the end of `run`, or the session being
//! dropped (task aborted, runtime shut down).

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::SubscriptionRegistry;
use crate::client::{SessionId, Subscriber};
use crate::config::RegistrationPolicy;
use crate::persistence::{PersistenceQueue, SubscriptionRecord};
use crate::transport::message::{ClientRequest, ServerReply, Welcome};
use crate::utils::error::{ProtocolError, ValidationError};

/// Everything a session needs from the rest of the broker.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub registry: Arc<SubscriptionRegistry>,
    pub persistence: PersistenceQueue,
    pub policy: RegistrationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Registering,
    Active {
        identity: String,
        contact: Option<String>,
    },
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The peer closed the stream.
    PeerClosed,
    ReadFailed,
    WriteFailed,
    /// Registration rejected under the `disconnect` policy.
    Rejected,
    /// Closed by server shutdown.
    Shutdown,
}

impl fmt::Display for SessionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SessionExit::PeerClosed => "peer closed",
            SessionExit::ReadFailed => "read failed",
            SessionExit::WriteFailed => "write failed",
            SessionExit::Rejected => "registration rejected",
            SessionExit::Shutdown => "server shutdown",
        };
        f.write_str(reason)
    }
}

/// Releases the session's identity and subscriptions exactly once.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SubscriptionRegistry>,
    session: SessionId,
    identity: Option<String>,
    released: bool,
}

impl SessionGuard {
    pub fn new(registry: Arc<SubscriptionRegistry>, session: SessionId) -> Self {
        Self {
            registry,
            session,
            identity: None,
            released: false,
        }
    }

    /// Records the identity this session now holds.
    pub fn bind(&mut self, identity: &str) {
        self.identity = Some(identity.to_string());
    }

    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let removed = self.registry.unsubscribe_all(self.session);
        if let Some(identity) = self.identity.take() {
            self.registry.release_identity(&identity);
            debug!(session = %self.session, identity = %identity, removed, "Session released");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Event {
    Shutdown,
    Read(io::Result<usize>),
    Push(String),
}

enum Flow {
    Continue,
    Close(SessionExit),
}

pub struct Session<R, W> {
    id: SessionId,
    peer: String,
    ctx: SessionContext,
    reader: BufReader<R>,
    /// Bytes of the line being read; kept across `select!` iterations.
    line: Vec<u8>,
    writer: W,
    state: SessionState,
    guard: SessionGuard,
    outbox_tx: UnboundedSender<String>,
    outbox_rx: UnboundedReceiver<String>,
    shutdown: CancellationToken,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        ctx: SessionContext,
        reader: R,
        writer: W,
        peer: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        let id = SessionId::new();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            id,
            peer: peer.into(),
            guard: SessionGuard::new(ctx.registry.clone(), id),
            ctx,
            reader: BufReader::new(reader),
            line: Vec::new(),
            writer,
            state: SessionState::Connected,
            outbox_tx,
            outbox_rx,
            shutdown,
        }
    }

    /// Serves the connection until it ends, then cleans up.
    pub async fn run(mut self) -> SessionExit {
        info!(session = %self.id, peer = %self.peer, "Connection established");
        let exit = self.serve().await;

        self.state = SessionState::Closed;
        self.guard.release();
        let _ = self.writer.shutdown().await;
        info!(session = %self.id, peer = %self.peer, "Connection closed: {exit}");
        exit
    }

    async fn serve(&mut self) -> SessionExit {
        let welcome = Welcome::new(self.ctx.registry.catalog().names());
        let welcome = match serde_json::to_string(&welcome) {
            Ok(json) => json,
            Err(e) => {
                warn!(session = %self.id, "Failed to serialize welcome: {e}");
                return SessionExit::WriteFailed;
            }
        };
        if self.reply(&welcome).await.is_err() {
            return SessionExit::WriteFailed;
        }
        self.state = SessionState::Registering;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Event::Shutdown,
                read = self.reader.read_until(b'\n', &mut self.line) => Event::Read(read),
                Some(text) = self.outbox_rx.recv() => Event::Push(text),
            };

            match event {
                Event::Shutdown => return SessionExit::Shutdown,
                Event::Read(Ok(0)) if self.line.is_empty() => return SessionExit::PeerClosed,
                Event::Read(Err(e)) => {
                    debug!(session = %self.id, "Read failed: {e}");
                    return SessionExit::ReadFailed;
                }
                Event::Read(Ok(_)) => {
                    let raw = std::mem::take(&mut self.line);
                    match self.handle_line(&raw).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close(exit)) => return exit,
                        Err(_) => return self.write_failure(),
                    }
                }
                Event::Push(text) => {
                    if self.reply(&text).await.is_err() {
                        return self.write_failure();
                    }
                }
            }
        }
    }

    fn write_failure(&self) -> SessionExit {
        if self.shutdown.is_cancelled() {
            SessionExit::Shutdown
        } else {
            SessionExit::WriteFailed
        }
    }

    async fn handle_line(&mut self, raw: &[u8]) -> io::Result<Flow> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(source) => {
                let e = ProtocolError::Encoding { source };
                debug!(session = %self.id, "Invalid client message: {e:?}");
                self.reply(&e.to_string()).await?;
                return Ok(Flow::Continue);
            }
        };
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        let request = match ClientRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(session = %self.id, "Invalid client message: {e:?}");
                self.reply(&e.to_string()).await?;
                return Ok(Flow::Continue);
            }
        };

        let result = match request {
            ClientRequest::Register { identity, email } => match self.register(identity, email) {
                Ok(identity) => Ok(ServerReply::Registered(identity)),
                Err(rejection) => {
                    let close = matches!(self.state, SessionState::Registering)
                        && self.ctx.policy == RegistrationPolicy::Disconnect;
                    self.reply(&rejection.to_string()).await?;
                    if close {
                        return Ok(Flow::Close(SessionExit::Rejected));
                    }
                    return Ok(Flow::Continue);
                }
            },
            ClientRequest::Subscribe { topic } => self.subscribe(topic).map(ServerReply::Subscribed),
            ClientRequest::Unsubscribe { topic } => {
                self.unsubscribe(topic).map(ServerReply::Unsubscribed)
            }
            ClientRequest::Unknown { action } => Ok(ServerReply::UnknownAction(action)),
        };

        let text = match result {
            Ok(reply) => reply.to_string(),
            Err(rejection) => {
                debug!(session = %self.id, reason = rejection.as_label(), "Request rejected");
                rejection.to_string()
            }
        };
        self.reply(&text).await?;
        Ok(Flow::Continue)
    }

    fn register(
        &mut self,
        identity: Option<String>,
        email: Option<String>,
    ) -> Result<String, ValidationError> {
        if let SessionState::Active { identity, .. } = &self.state {
            return Err(ValidationError::AlreadyRegistered(identity.clone()));
        }
        let identity = identity.ok_or(ValidationError::MissingIdentity)?;
        if !self.ctx.registry.register_identity(&identity) {
            return Err(ValidationError::IdentityInUse(identity));
        }
        self.guard.bind(&identity);

        let contact = email.or_else(|| identity.contains('@').then(|| identity.clone()));
        info!(session = %self.id, identity = %identity, "Registered");
        self.state = SessionState::Active {
            identity: identity.clone(),
            contact,
        };
        Ok(identity)
    }

    fn subscribe(&self, topic: Option<String>) -> Result<String, ValidationError> {
        let SessionState::Active { identity, contact } = &self.state else {
            return Err(ValidationError::NotRegistered);
        };
        let topic = topic.ok_or(ValidationError::MissingTopic)?;

        let subscriber = Subscriber::new(
            self.id,
            identity.clone(),
            contact.clone(),
            self.outbox_tx.clone(),
        );
        self.ctx.registry.subscribe(&topic, subscriber)?;
        info!(session = %self.id, identity = %identity, topic = %topic, "Subscribed");

        if let Err(e) = self
            .ctx
            .persistence
            .enqueue(SubscriptionRecord::now(identity, &topic))
        {
            warn!(identity = %identity, topic = %topic, "Subscription not persisted: {e}");
        }
        Ok(topic)
    }

    fn unsubscribe(&self, topic: Option<String>) -> Result<String, ValidationError> {
        let SessionState::Active { identity, .. } = &self.state else {
            return Err(ValidationError::NotRegistered);
        };
        let topic = topic.ok_or(ValidationError::MissingTopic)?;
        self.ctx.registry.unsubscribe(&topic, identity)?;
        info!(session = %self.id, identity = %identity, topic = %topic, "Unsubscribed");
        Ok(topic)
    }

    /// Writes one line; gives up if shutdown starts while the peer is not
    /// reading.
    async fn reply(&mut self, text: &str) -> io::Result<()> {
        let writer = &mut self.writer;
        let write = async move {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        tokio::select! {
            result = write => result,
            _ = self.shutdown.cancelled() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "session closed by shutdown",
            )),
        }
    }
}
