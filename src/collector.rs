//! Single-file tailing collector. Generalizes the pre-existing file-source
//! ingestion loop with two behaviors the spec requires that it lacked: a
//! poll for a not-yet-existing file, and seeking to EOF on open so only
//! lines appended after the collector starts are tailed.

use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::parser::parse_log_line;
use crate::models::Event;

const MISSING_FILE_POLL: Duration = Duration::from_secs(5);
const EOF_BACKOFF: Duration = Duration::from_millis(100);

pub struct Collector {
    pub source: String,
    path: String,
}

impl Collector {
    pub fn new(source: String, path: String) -> Self {
        Self { source, path }
    }

    /// Runs until cancellation (via `shutdown_rx`) or an unrecoverable I/O
    /// error. Never returns an error for a missing file; polls until it
    /// appears.
    pub async fn run(self, event_tx: mpsc::Sender<Event>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut file = loop {
            tokio::select! {
                opened = File::open(&self.path) => {
                    match opened {
                        Ok(f) => break f,
                        Err(_) => {
                            warn!(source = %self.source, path = %self.path, "log source file does not exist yet, retrying");
                            tokio::select! {
                                _ = tokio::time::sleep(MISSING_FILE_POLL) => {}
                                _ = shutdown_rx.recv() => {
                                    info!(source = %self.source, "collector cancelled while waiting for file to appear");
                                    return;
                                }
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(source = %self.source, "collector cancelled while waiting for file to appear");
                    return;
                }
            }
        };

        if let Err(e) = file.seek(std::io::SeekFrom::End(0)).await {
            error!(source = %self.source, error = %e, "failed to seek to end of file, tailing from current position");
        }

        let mut lines = BufReader::new(file).lines();

        loop {
            tokio::select! {
                line_result = lines.next_line() => {
                    match line_result {
                        Ok(Some(line)) => {
                            let event = parse_log_line(&line, &self.source);
                            if event_tx.send(event).await.is_err() {
                                info!(source = %self.source, "event channel closed, stopping collector");
                                return;
                            }
                        }
                        Ok(None) => {
                            tokio::time::sleep(EOF_BACKOFF).await;
                        }
                        Err(e) => {
                            error!(source = %self.source, error = %e, "unrecoverable I/O error reading log source, stopping collector");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(source = %self.source, "collector received shutdown signal");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::time::timeout;

    #[tokio::test]
    async fn tails_lines_appended_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::File::create(&path).unwrap().write_all(b"pre-existing line\n").unwrap();

        let collector = Collector::new("test-source".to_string(), path.to_string_lossy().to_string());
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(collector.run(event_tx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"new line appears here\n").unwrap();

        let event = timeout(Duration::from_secs(2), event_rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.message, "new line appears here");

        shutdown_tx.send(()).await.ok();
        handle.await.ok();
    }

    #[tokio::test]
    async fn polls_until_missing_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-yet.log");

        let collector = Collector::new("poll-source".to_string(), path.to_string_lossy().to_string());
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(collector.run(event_tx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::File::create(&path).unwrap();
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"line after creation\n").unwrap();

        // the collector polls every 5s for a missing file; we don't wait that long in a
        // unit test, so just confirm cancellation works cleanly while still polling.
        shutdown_tx.send(()).await.ok();
        let result = timeout(Duration::from_millis(500), handle).await;
        assert!(result.is_ok());
        drop(event_rx);
    }
}
