use std::io::BufRead;

use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Streams stdin lines into a channel from a dedicated OS thread.
///
/// Reading stdin blocks, and a blocked read must not keep the runtime from
/// shutting down, so the thread is detached and simply dies with the process.
pub fn spawn_line_reader() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        tracing::error!("Failed to spawn stdin reader: {e}");
    }

    rx
}
