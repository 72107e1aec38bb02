//! Accept loop
//!
//! Accepts TCP connections and runs one [`Session`] per connection on the
//! shared `TaskTracker`. The loop stops as soon as `stop_accepting` is
//! cancelled; sessions stop when `close_sessions` is.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::transport::message::ServerReply;
use crate::transport::session::{Session, SessionContext};

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct AcceptLoop {
    pub listener: TcpListener,
    pub ctx: SessionContext,
    pub connection_limit: Arc<Semaphore>,
    pub stop_accepting: CancellationToken,
    pub close_sessions: CancellationToken,
    pub sessions: TaskTracker,
}

impl AcceptLoop {
    pub async fn run(self) {
        let addr = self
            .listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        info!("Listening on {addr}");

        loop {
            let accepted = tokio::select! {
                _ = self.stop_accepting.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_session(stream, peer.to_string()),
                Err(e) => {
                    warn!("Failed to accept connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!("Stopped accepting connections on {addr}");
    }

    fn spawn_session(&self, mut stream: TcpStream, peer: String) {
        let Ok(permit) = self.connection_limit.clone().try_acquire_owned() else {
            warn!(peer = %peer, "Connection refused: server is full");
            self.sessions.spawn(async move {
                let line = format!("{}\n", ServerReply::ServerFull);
                let _ = stream.write_all(line.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
            return;
        };

        let (reader, writer) = stream.into_split();
        let session = Session::new(
            self.ctx.clone(),
            reader,
            writer,
            peer,
            self.close_sessions.child_token(),
        );
        self.sessions.spawn(async move {
            session.run().await;
            drop(permit);
        });
    }
}
