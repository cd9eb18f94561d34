// Follow module - attaches to one log file and emits framed lines

mod decoder;

pub use decoder::LineDecoder;

use crate::error::LogmuxError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};
use tracing::debug;

/// How newly appended bytes are obtained from the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowSource {
    /// Poll-read the file from within this process
    #[default]
    Native,
    /// Spawn the system `tail -F` and read its stdout
    External,
}

/// Options for opening a log follower
#[derive(Debug, Clone)]
pub struct FollowOptions {
    /// Number of existing lines to emit when attaching
    pub tail_lines: usize,
    /// Mechanism used to follow the file
    pub source: FollowSource,
    /// Delay between read attempts for the native source
    pub poll_interval: Duration,
}

impl Default for FollowOptions {
    fn default() -> Self {
        Self {
            tail_lines: 100,
            source: FollowSource::Native,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Events emitted by a LineFollower
#[derive(Debug)]
pub enum FollowEvent {
    /// One decoded line; keeps its trailing newline except for a final flush
    Line(String),
    /// The follower failed to start or a read failed
    Error(LogmuxError),
    /// The follower stopped; always the last event
    Closed,
}

/// Handle to a running log follower task
///
/// The task emits the last N lines already present in the file, then newly
/// appended content, over the receiver returned by `open`. Dropping the
/// handle without closing aborts the task.
pub struct LineFollower {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LineFollower {
    /// Attach to a log file and start emitting lines
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: FollowOptions,
    ) -> (Self, mpsc::Receiver<FollowEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let path = path.as_ref().to_path_buf();

        let task = tokio::spawn(async move {
            match options.source {
                FollowSource::Native => follow_native(path, options, tx, shutdown_rx).await,
                FollowSource::External => follow_external(path, options, tx, shutdown_rx).await,
            }
        });

        (
            Self {
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            rx,
        )
    }

    /// Request termination of the follow task; repeated calls have no effect
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the follow task to finish
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LineFollower {
    fn drop(&mut self) {
        // A handle dropped without close() must not leave the task running
        if self.shutdown.is_some() {
            if let Some(task) = &self.task {
                task.abort();
            }
        }
    }
}

/// Follow a file by reading to EOF, sleeping, and reading again
async fn follow_native(
    path: PathBuf,
    options: FollowOptions,
    tx: mpsc::Sender<FollowEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            let _ = tx
                .send(FollowEvent::Error(LogmuxError::FollowSpawnError(
                    path.display().to_string(),
                    e.to_string(),
                )))
                .await;
            let _ = tx.send(FollowEvent::Closed).await;
            return;
        }
    };

    let mut decoder = LineDecoder::new();
    let mut buf = vec![0u8; 8192];

    // Initial pass: read the existing content and emit only the trailing
    // window of complete lines. An unterminated fragment stays pending.
    let mut initial = Vec::new();
    loop {
        match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => initial.extend_from_slice(&buf[..n]),
            Err(e) => {
                let _ = tx
                    .send(FollowEvent::Error(LogmuxError::FollowStreamError(
                        path.display().to_string(),
                        e.to_string(),
                    )))
                    .await;
                let _ = tx.send(FollowEvent::Closed).await;
                return;
            }
        }
    }

    let lines = decoder.push(&initial);
    let skip = lines.len().saturating_sub(options.tail_lines);
    for line in lines.into_iter().skip(skip) {
        if tx.send(FollowEvent::Line(line)).await.is_err() {
            return;
        }
    }

    debug!(path = %path.display(), "following log file");

    // Follow loop: emit appended bytes until asked to stop. The fd keeps
    // pointing at the original file; rotation is handled by whoever owns
    // this follower replacing it against the new identity.
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            read = file.read(&mut buf) => match read {
                Ok(0) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(options.poll_interval) => {}
                    }
                }
                Ok(n) => {
                    for line in decoder.push(&buf[..n]) {
                        if tx.send(FollowEvent::Line(line)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(FollowEvent::Error(LogmuxError::FollowStreamError(
                            path.display().to_string(),
                            e.to_string(),
                        )))
                        .await;
                    break;
                }
            }
        }
    }

    flush_and_close(&mut decoder, &tx).await;
}

/// Follow a file through the system `tail -F`, feeding its stdout through
/// the same decoder
async fn follow_external(
    path: PathBuf,
    options: FollowOptions,
    tx: mpsc::Sender<FollowEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut child = match Command::new("tail")
        .arg("-F")
        .arg("-n")
        .arg(options.tail_lines.to_string())
        .arg(&path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = tx
                .send(FollowEvent::Error(LogmuxError::FollowSpawnError(
                    path.display().to_string(),
                    e.to_string(),
                )))
                .await;
            let _ = tx.send(FollowEvent::Closed).await;
            return;
        }
    };

    let mut stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = tx
                .send(FollowEvent::Error(LogmuxError::FollowSpawnError(
                    path.display().to_string(),
                    "no stdout pipe available".to_string(),
                )))
                .await;
            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = tx.send(FollowEvent::Closed).await;
            return;
        }
    };

    debug!(path = %path.display(), "following log file via tail");

    let mut decoder = LineDecoder::new();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                break;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => {
                    // tail exited on its own
                    let _ = child.wait().await;
                    break;
                }
                Ok(n) => {
                    for line in decoder.push(&buf[..n]) {
                        if tx.send(FollowEvent::Line(line)).await.is_err() {
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(FollowEvent::Error(LogmuxError::FollowStreamError(
                            path.display().to_string(),
                            e.to_string(),
                        )))
                        .await;
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    break;
                }
            }
        }
    }

    flush_and_close(&mut decoder, &tx).await;
}

/// Flush any trailing fragment, then announce the close
async fn flush_and_close(decoder: &mut LineDecoder, tx: &mpsc::Sender<FollowEvent>) {
    if let Some(rest) = decoder.finish() {
        let _ = tx.send(FollowEvent::Line(rest)).await;
    }
    let _ = tx.send(FollowEvent::Closed).await;
}
