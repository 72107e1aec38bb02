//! Lifecycle coordinator
//!
//! [`NotificationServer::start`] starts the persistence worker (which opens
//! the subscription store), binds the listener and spawns the accept loop.
//! [`NotificationServer::serve`] adds the operator console and waits for the
//! shutdown signal (`exit` on the console, or Ctrl-C).
//!
//! Shutdown order:
//! 1. stop accepting connections
//! 2. force-close every open session; each one releases its registry entries
//! 3. wait for the accept loop and all sessions to finish
//! 4. send the sentinel to the persistence worker and wait for it to drain
//!
//! `shutdown` may be called any number of times; only the first call acts.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::broker::{Dispatcher, SubscriptionRegistry, TopicCatalog};
use crate::config::Settings;
use crate::console::run_console;
use crate::jobs::JobSubmitter;
use crate::persistence::{PersistenceWorker, WorkerStats};
use crate::transport::{AcceptLoop, SessionContext};
use crate::utils::error::ServerError;

/// What a completed shutdown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub persistence: Option<WorkerStats>,
}

pub struct NotificationServer {
    local_addr: SocketAddr,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    persistence: PersistenceWorker,
    sessions: TaskTracker,
    stop_accepting: CancellationToken,
    close_sessions: CancellationToken,
    shutdown_requested: CancellationToken,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
    finished: Mutex<Option<ShutdownReport>>,
}

impl NotificationServer {
    /// Starts everything except the console.
    ///
    /// The persistence worker opens the store on its own thread. Failing to
    /// open it or to bind the listener is fatal.
    pub async fn start(
        settings: &Settings,
        jobs: Arc<dyn JobSubmitter>,
    ) -> Result<Self, ServerError> {
        let persistence = PersistenceWorker::open(&settings.persistence.path).await?;
        Self::launch(settings, jobs, persistence).await
    }

    async fn launch(
        settings: &Settings,
        jobs: Arc<dyn JobSubmitter>,
        persistence: PersistenceWorker,
    ) -> Result<Self, ServerError> {
        let addr = settings.server.addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                persistence.shutdown().await;
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;

        let registry = Arc::new(SubscriptionRegistry::new(TopicCatalog::new(
            settings.broker.topics.iter().cloned(),
        )));
        let dispatcher = Arc::new(Dispatcher::from_settings(
            registry.clone(),
            jobs,
            &settings.jobs,
        ));

        let sessions = TaskTracker::new();
        let stop_accepting = CancellationToken::new();
        let close_sessions = CancellationToken::new();

        let accept_loop = AcceptLoop {
            listener,
            ctx: SessionContext {
                registry: registry.clone(),
                persistence: persistence.queue(),
                policy: settings.broker.registration_policy,
            },
            connection_limit: Arc::new(Semaphore::new(settings.broker.max_connections)),
            stop_accepting: stop_accepting.clone(),
            close_sessions: close_sessions.clone(),
            sessions: sessions.clone(),
        };
        let accept_loop = tokio::spawn(accept_loop.run());

        info!(addr = %local_addr, topics = ?registry.catalog().names(), "Server started");

        Ok(Self {
            local_addr,
            registry,
            dispatcher,
            persistence,
            sessions,
            stop_accepting,
            close_sessions,
            shutdown_requested: CancellationToken::new(),
            accept_loop: Mutex::new(Some(accept_loop)),
            finished: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Token that asks `serve` to shut the server down.
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown_requested.clone()
    }

    /// Runs the operator console until shutdown is requested, then shuts
    /// down.
    pub async fn serve<W>(&self, console: UnboundedReceiver<String>, out: W) -> ShutdownReport
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let console = tokio::spawn(run_console(
            console,
            out,
            self.dispatcher.clone(),
            self.shutdown_requested.clone(),
        ));

        wait_for_shutdown(&self.shutdown_requested, tokio::signal::ctrl_c()).await;

        let report = self.shutdown().await;
        match console.await {
            Ok(Err(e)) => error!("Console failed: {e}"),
            Err(e) => error!("Console task failed: {e}"),
            Ok(Ok(())) => {}
        }
        report
    }

    pub async fn shutdown(&self) -> ShutdownReport {
        let mut finished = self.finished.lock().await;
        if let Some(report) = *finished {
            return report;
        }
        info!("Shutting down");
        self.shutdown_requested.cancel();

        self.stop_accepting.cancel();
        self.close_sessions.cancel();

        if let Some(accept_loop) = self.accept_loop.lock().await.take() {
            if let Err(e) = accept_loop.await {
                error!("Accept loop failed: {e}");
            }
        }
        self.sessions.close();
        self.sessions.wait().await;
        info!(
            registered = self.registry.registered_count(),
            "All sessions closed"
        );

        let report = ShutdownReport {
            persistence: self.persistence.shutdown().await,
        };
        *finished = Some(report);
        info!("Shutdown complete");
        report
    }
}

/// Returns once `requested` is cancelled. `signal` completing successfully
/// cancels it; a signal that cannot be installed is logged and ignored.
async fn wait_for_shutdown<F>(requested: &CancellationToken, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    tokio::select! {
        _ = requested.cancelled() => return,
        result = signal => match result {
            Ok(()) => {
                info!("Shutdown signal received");
                requested.cancel();
                return;
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {e}"),
        },
    }
    requested.cancelled().await;
}
