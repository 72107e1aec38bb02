//! Operator console
//!
//! Two commands: `send <topic> <message...>` and `exit`. The loop reads
//! lines from a channel (stdin in production), runs sends through the
//! [`Dispatcher`] and writes one report line per command to `out`.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::{DispatchOutcome, DispatchReport, Dispatcher};

pub const USAGE: &str = "Unrecognized command. Use 'send <topic> <message>' or 'exit'.";
pub const SEND_USAGE: &str = "Invalid format. Usage: send <topic> <message>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Send { topic: String, message: String },
    Exit,
    Empty,
}

impl OperatorCommand {
    /// Parses one console line. The message is everything after the topic.
    pub fn parse(line: &str) -> Result<Self, &'static str> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));

        match word {
            "" => Ok(OperatorCommand::Empty),
            "exit" if rest.trim().is_empty() => Ok(OperatorCommand::Exit),
            "send" => {
                let rest = rest.trim_start();
                match rest.split_once(' ') {
                    Some((topic, message)) if !message.trim().is_empty() => {
                        Ok(OperatorCommand::Send {
                            topic: topic.to_string(),
                            message: message.trim().to_string(),
                        })
                    }
                    _ => Err(SEND_USAGE),
                }
            }
            _ => Err(USAGE),
        }
    }
}

/// Operator-facing summary of a finished send.
pub fn describe(report: &DispatchReport) -> String {
    match &report.outcome {
        DispatchOutcome::NoSubscribers => {
            format!("No subscribers for topic '{}'.", report.topic)
        }
        DispatchOutcome::Delivered(summary) => {
            let mut text = format!(
                "Notification sent to {}/{} subscribers of '{}'.",
                summary.delivered, summary.attempted, report.topic
            );
            if summary.emails_sent + summary.emails_failed > 0 {
                text.push_str(&format!(
                    " Emails: {} sent, {} failed.",
                    summary.emails_sent, summary.emails_failed
                ));
            }
            text
        }
    }
}

/// Runs the operator loop until `exit`, end of input, or `shutdown`.
///
/// `exit` cancels `shutdown` itself so the coordinator can take over.
pub async fn run_console<W>(
    mut input: UnboundedReceiver<String>,
    mut out: W,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = input.recv() => line,
        };
        let Some(line) = line else {
            info!("Console input closed");
            break;
        };

        let text = match OperatorCommand::parse(&line) {
            Ok(OperatorCommand::Empty) => continue,
            Ok(OperatorCommand::Exit) => {
                write_line(&mut out, "Shutting down the server...").await?;
                shutdown.cancel();
                break;
            }
            Ok(OperatorCommand::Send { topic, message }) => {
                write_line(&mut out, "Processing notification...").await?;
                match dispatcher.send(&topic, &message).await {
                    Ok(report) => format!("{}\n{}", report.processing, describe(&report)),
                    Err(e) => {
                        warn!(topic = %topic, reason = e.as_label(), "Send aborted");
                        format!("Send aborted: {e}")
                    }
                }
            }
            Err(usage) => usage.to_string(),
        };
        write_line(&mut out, &text).await?;
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::{OperatorCommand, SEND_USAGE, USAGE, run_console};
    use crate::broker::{Dispatcher, SubscriptionRegistry, TopicCatalog};
    use crate::jobs::{LocalJobPool, MemoryMailer};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_parse_send_keeps_full_message() {
        assert_eq!(
            OperatorCommand::parse("send Yoga class moved to 7pm"),
            Ok(OperatorCommand::Send {
                topic: "Yoga".into(),
                message: "class moved to 7pm".into()
            })
        );
    }

    #[test]
    fn test_parse_send_requires_topic_and_message() {
        assert_eq!(OperatorCommand::parse("send"), Err(SEND_USAGE));
        assert_eq!(OperatorCommand::parse("send Yoga"), Err(SEND_USAGE));
        assert_eq!(OperatorCommand::parse("send Yoga   "), Err(SEND_USAGE));
    }

    #[test]
    fn test_parse_exit_and_unknown() {
        assert_eq!(OperatorCommand::parse(" exit "), Ok(OperatorCommand::Exit));
        assert_eq!(OperatorCommand::parse(""), Ok(OperatorCommand::Empty));
        assert_eq!(OperatorCommand::parse("publish Yoga hi"), Err(USAGE));
        assert_eq!(OperatorCommand::parse("exit now"), Err(USAGE));
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let registry = Arc::new(SubscriptionRegistry::new(TopicCatalog::new(["Yoga"])));
        let jobs = Arc::new(LocalJobPool::new(
            1,
            Duration::ZERO,
            Arc::new(MemoryMailer::default()),
        ));
        Arc::new(Dispatcher::new(
            registry,
            jobs,
            Duration::from_secs(1),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_console_reports_and_exits() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let mut out = Vec::new();

        tx.send("send Yoga hello".to_string()).unwrap();
        tx.send("bogus".to_string()).unwrap();
        tx.send("exit".to_string()).unwrap();
        tx.send("send Yoga never".to_string()).unwrap();

        run_console(rx, &mut out, dispatcher(), shutdown.clone())
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Notification processed for topic 'Yoga': hello"));
        assert!(out.contains("No subscribers for topic 'Yoga'."));
        assert!(out.contains(USAGE));
        assert!(out.contains("Shutting down"));
        assert!(!out.contains("never"));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_console_stops_on_external_shutdown() {
        let (_tx, rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut out = Vec::new();
        run_console(rx, &mut out, dispatcher(), shutdown)
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
