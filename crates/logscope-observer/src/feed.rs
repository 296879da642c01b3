use std::path::Path;

use logscope_types::DiscoveryEvent;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Instance-discovery feed reading JSON-lines events
pub struct EventFeed {
    /// Event receiver
    receiver: mpsc::UnboundedReceiver<DiscoveryEvent>,

    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,

    /// Reader task handle
    task: tokio::task::JoinHandle<()>,
}

impl EventFeed {
    /// Start reading events from a recorded feed file
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(file))
    }

    /// Start reading events from any async source, one JSON object per line
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let mut lines = BufReader::new(reader).lines();
                let mut line_number = 0u64;

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,

                        result = lines.next_line() => {
                            match result {
                                Ok(Some(line)) => {
                                    line_number += 1;
                                    let line = line.trim();
                                    if line.is_empty() {
                                        continue;
                                    }

                                    match serde_json::from_str::<DiscoveryEvent>(line) {
                                        Ok(event) => {
                                            if sender.send(event).is_err() {
                                                // Receiver dropped
                                                break;
                                            }
                                        }
                                        Err(e) => {
                                            warn!(
                                                line = line_number,
                                                "skipping malformed event: {}", e
                                            );
                                        }
                                    }
                                }
                                Ok(None) => {
                                    debug!(lines = line_number, "discovery feed ended");
                                    break;
                                }
                                Err(e) => {
                                    warn!("discovery feed read error: {}", e);
                                    break;
                                }
                            }
                        }
                    }
                }
            })
        };

        Self {
            receiver,
            cancel,
            task,
        }
    }

    /// Receive the next event, `None` once the feed is exhausted
    pub async fn next(&mut self) -> Option<DiscoveryEvent> {
        self.receiver.recv().await
    }

    /// Stop reading
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Check if the reader task is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
