//! Terminal client
//!
//! Reads commands from the user, encodes them as protocol lines and prints
//! everything the server sends back, including pushed notifications.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::transport::ClientMessage;
use crate::utils::error::ServerError;
use crate::utils::stdin::spawn_line_reader;

pub const HELP: &str = "Commands: register <identity> [email] | subscribe <topic> | unsubscribe <topic> | exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Send(ClientMessage),
    Exit,
    Empty,
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, &'static str> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(ClientCommand::Empty);
        };
        let args: Vec<&str> = words.collect();

        let message = match (command, args.as_slice()) {
            ("exit", []) => return Ok(ClientCommand::Exit),
            ("register", [identity]) => ClientMessage::Register {
                identity: identity.to_string(),
                email: None,
            },
            ("register", [identity, email]) => ClientMessage::Register {
                identity: identity.to_string(),
                email: Some(email.to_string()),
            },
            ("subscribe", [topic]) => ClientMessage::Subscribe {
                topic: topic.to_string(),
            },
            ("unsubscribe", [topic]) => ClientMessage::Unsubscribe {
                topic: topic.to_string(),
            },
            _ => return Err(HELP),
        };
        Ok(ClientCommand::Send(message))
    }
}

/// Why the client loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    UserExit,
    InputClosed,
    ServerClosed,
}

/// Runs the client over an established stream until the user exits or the
/// server hangs up.
pub async fn run_client<S, W>(
    stream: S,
    mut input: UnboundedReceiver<String>,
    mut out: W,
) -> std::io::Result<ClientExit>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut server_lines = BufReader::new(reader).lines();

    let exit = loop {
        tokio::select! {
            line = server_lines.next_line() => match line? {
                Some(line) => print_line(&mut out, &line).await?,
                None => {
                    print_line(&mut out, "Connection closed by server.").await?;
                    break ClientExit::ServerClosed;
                }
            },
            line = input.recv() => {
                let Some(line) = line else {
                    break ClientExit::InputClosed;
                };
                match ClientCommand::parse(&line) {
                    Ok(ClientCommand::Send(message)) => {
                        let line = message.to_line();
                        debug!("Sending {line}");
                        writer.write_all(line.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                        writer.flush().await?;
                    }
                    Ok(ClientCommand::Exit) => break ClientExit::UserExit,
                    Ok(ClientCommand::Empty) => {}
                    Err(help) => print_line(&mut out, help).await?,
                }
            }
        }
    };

    let _ = writer.shutdown().await;
    Ok(exit)
}

/// Connects to `addr` and runs the client on stdin and stdout.
pub async fn run_interactive_client(addr: &str) -> Result<ClientExit, ServerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ServerError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr, "Connected");

    let mut stdout = tokio::io::stdout();
    print_line(&mut stdout, HELP).await?;
    let exit = run_client(stream, spawn_line_reader(), stdout).await?;
    info!(?exit, "Client stopped");
    Ok(exit)
}

async fn print_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
