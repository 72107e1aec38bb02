//! CLI for livenotify
//!
//! Subcommands:
//! - `server`: run the broker with the operator console on stdin
//! - `client`: run the terminal client against a running broker

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use livenotify::client::interactive::run_interactive_client;
use livenotify::config::{Settings, load_config};
use livenotify::jobs::{LocalJobPool, LogMailer};
use livenotify::server::NotificationServer;
use livenotify::utils::error::ServerError;
use livenotify::utils::logging;
use livenotify::utils::stdin::spawn_line_reader;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "livenotify")]
enum Command {
    /// Start the notification server
    Server {
        /// Interface to bind, overrides the configuration
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the configuration
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the interactive client
    Client {
        /// Server address to connect to
        #[arg(long, default_value = "127.0.0.1:8888")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match load_config().map_err(ServerError::from) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let result = match Command::parse() {
        Command::Server { host, port } => run_server(settings, host, port).await,
        Command::Client { addr } => run_interactive_client(&addr).await.map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), ServerError> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let jobs = Arc::new(LocalJobPool::from_settings(
        &settings.jobs,
        Arc::new(LogMailer),
    ));
    let server = NotificationServer::start(&settings, jobs).await?;
    println!(
        "Server listening on {}. Commands: send <topic> <message> | exit",
        server.local_addr()
    );

    let report = server.serve(spawn_line_reader(), tokio::io::stdout()).await;
    if let Some(stats) = report.persistence {
        info!(
            stored = stats.inserted,
            failed = stats.failed,
            "Subscriptions persisted"
        );
    }
    Ok(())
}
