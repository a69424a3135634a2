//! Line and status sinks used by the command-line client

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mc_core::traits::{LineSink, StatusSink};
use mc_core::StatusUpdate;

/// Timestamp prefix written before every history line
const HISTORY_TIMESTAMP: &str = "[%d.%m.%y %H:%M]";

/// Format one history line with the current local time
pub fn stamp_line(line: &str) -> String {
    format!(
        "{} {}",
        chrono::Local::now().format(HISTORY_TIMESTAMP),
        line.trim_end()
    )
}

/// Prints chat lines to stdout
pub struct ConsoleSink;

impl LineSink for ConsoleSink {
    fn push(&self, line: &str) {
        println!("{}", line.trim_end());
    }
}

/// Routes status updates into the tracing pipeline
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn publish(&self, update: StatusUpdate) {
        match &update {
            StatusUpdate::Liveness { .. } => tracing::info!(target: "watchdog", "{}", update),
            StatusUpdate::Idle { .. } => tracing::debug!(target: "watchdog", "{}", update),
            StatusUpdate::Reconnecting { .. } => tracing::warn!("{}", update),
            _ => tracing::info!("{}", update),
        }
    }
}

/// Appends timestamped chat lines to the history file.
///
/// Lines are queued and written by a background task, so `push` never blocks
/// the read session. The task finishes once every writer handle is dropped.
#[derive(Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl HistoryWriter {
    /// Open `path` for appending and start the writer task
    pub async fn spawn(path: impl Into<PathBuf>) -> io::Result<(Self, JoinHandle<()>)> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let stamped = stamp_line(&line) + "\n";
                if let Err(e) = file.write_all(stamped.as_bytes()).await {
                    tracing::error!("Failed to write history to {}: {}", path.display(), e);
                    return;
                }
                if let Err(e) = file.flush().await {
                    tracing::error!("Failed to flush history {}: {}", path.display(), e);
                    return;
                }
            }
            tracing::debug!("History writer finished");
        });

        Ok((Self { tx }, handle))
    }
}

impl LineSink for HistoryWriter {
    fn push(&self, line: &str) {
        if self.tx.send(line.to_string()).is_err() {
            tracing::warn!("History writer stopped, dropping line");
        }
    }
}

/// Replay an existing history file into `sink`.
///
/// Returns the number of lines replayed; a missing file replays nothing.
pub async fn preload_history(path: &Path, sink: &dyn LineSink) -> io::Result<usize> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    for line in content.lines() {
        sink.push(line);
        count += 1;
    }
    tracing::debug!("Replayed {} history lines from {}", count, path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stamp_line_format() {
        let stamped = stamp_line("hello\n");
        // "[dd.mm.yy HH:MM] hello"
        assert_eq!(stamped.len(), 16 + 1 + 5);
        assert!(stamped.starts_with('['));
        assert_eq!(&stamped[15..16], "]");
        assert!(stamped.ends_with("] hello"));
    }

    #[tokio::test]
    async fn test_history_writer_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("history.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "earlier line\n").unwrap();

        let (writer, handle) = HistoryWriter::spawn(&path).await.unwrap();
        writer.push("first");
        writer.push("second\n");
        drop(writer);
        handle.await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "earlier line");
        assert!(lines[1].ends_with("] first"));
        assert!(lines[2].ends_with("] second"));
    }

    #[tokio::test]
    async fn test_history_writer_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("history.txt");

        let (writer, handle) = HistoryWriter::spawn(path.clone()).await.unwrap();
        writer.push("line");
        drop(writer);
        handle.await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_preload_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.txt");
        std::fs::write(&path, "[01.01.24 10:00] one\n[01.01.24 10:01] two\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let count = preload_history(&path, &tx).await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(rx.try_recv().unwrap(), "[01.01.24 10:00] one");
        assert_eq!(rx.try_recv().unwrap(), "[01.01.24 10:01] two");
    }

    #[tokio::test]
    async fn test_preload_missing_history() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel::<String>();

        let count = preload_history(&dir.path().join("absent.txt"), &tx)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
