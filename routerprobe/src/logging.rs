//! Per-router session log.
//!
//! A single spawned writer task owns the log file and an in-memory copy of
//! everything appended; cloneable handles send it operations over a
//! channel. Serializing all appends and the final full-log read through
//! one owner means no lock is ever taken on the log itself.

use std::io;
use std::path::Path;

use chrono::Local;
use log::warn;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

enum LogOp {
    Append(Vec<u8>, oneshot::Sender<io::Result<()>>),
    Snapshot(oneshot::Sender<Vec<u8>>),
    Close(oneshot::Sender<io::Result<()>>),
}

/// Handle to a router's session log.
#[derive(Clone)]
pub struct SessionLog {
    tx: mpsc::Sender<LogOp>,
    file_name: String,
}

impl SessionLog {
    /// Create the log file `<prefix>_<timestamp>.log` under `dir` and
    /// spawn its writer task.
    pub async fn create(prefix: &str, dir: impl AsRef<Path>) -> io::Result<Self> {
        let ts = Local::now().format("%Y-%m-%d_%H:%M:%S");
        let file_name = format!("{prefix}_{ts}.log");
        let path = dir.as_ref().join(&file_name);
        let file = File::create(&path).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run_writer(file, rx));

        Ok(Self { tx, file_name })
    }

    /// Append bytes to the log, awaiting the writer's acknowledgment.
    pub async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(LogOp::Append(bytes.to_vec(), ack))
            .await
            .map_err(|_| closed())?;
        done.await.map_err(|_| closed())?
    }

    /// Return everything appended so far.
    pub async fn snapshot(&self) -> io::Result<Vec<u8>> {
        let (reply, content) = oneshot::channel();
        self.tx
            .send(LogOp::Snapshot(reply))
            .await
            .map_err(|_| closed())?;
        content.await.map_err(|_| closed())
    }

    /// Flush the file and stop the writer. Later operations on any handle
    /// fail with a broken-pipe error.
    pub async fn close(&self) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(LogOp::Close(ack))
            .await
            .map_err(|_| closed())?;
        done.await.map_err(|_| closed())?
    }

    /// The log's file name (without directory).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "session log closed")
}

async fn run_writer(mut file: File, mut rx: mpsc::Receiver<LogOp>) {
    let mut copy: Vec<u8> = Vec::new();
    while let Some(op) = rx.recv().await {
        match op {
            LogOp::Append(bytes, ack) => {
                let result = file.write_all(&bytes).await;
                if result.is_ok() {
                    copy.extend_from_slice(&bytes);
                }
                let _ = ack.send(result);
            }
            LogOp::Snapshot(reply) => {
                let _ = reply.send(copy.clone());
            }
            LogOp::Close(ack) => {
                let _ = ack.send(file.flush().await);
                return;
            }
        }
    }
    // All handles dropped without an explicit close.
    if let Err(e) = file.flush().await {
        warn!("failed to flush session log: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_snapshot() {
        let prefix = format!("routerprobe-log-test-{}", std::process::id());
        let dir = std::env::temp_dir();
        let log = SessionLog::create(&prefix, &dir).await.unwrap();

        log.append(b"=========> show clock\n").await.unwrap();
        log.append(b"12:00:00 UTC\n\n").await.unwrap();

        let content = log.snapshot().await.unwrap();
        assert_eq!(content, b"=========> show clock\n12:00:00 UTC\n\n");

        log.close().await.unwrap();
        let path = dir.join(log.file_name());
        let on_disk = tokio::fs::read(&path).await.unwrap();
        assert_eq!(on_disk, content);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_name_carries_prefix() {
        let prefix = format!("routerprobe-name-test-{}", std::process::id());
        let dir = std::env::temp_dir();
        let log = SessionLog::create(&prefix, &dir).await.unwrap();
        assert!(log.file_name().starts_with(&prefix));
        assert!(log.file_name().ends_with(".log"));
        log.close().await.unwrap();
        tokio::fs::remove_file(dir.join(log.file_name())).await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_after_close_fail() {
        let prefix = format!("routerprobe-closed-test-{}", std::process::id());
        let dir = std::env::temp_dir();
        let log = SessionLog::create(&prefix, &dir).await.unwrap();
        log.close().await.unwrap();
        assert!(log.append(b"late").await.is_err());
        tokio::fs::remove_file(dir.join(log.file_name())).await.unwrap();
    }
}
