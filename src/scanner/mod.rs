// Scanner module - discovers service directories and tracks their identity

use crate::error::{LogmuxError, Result};
use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Filesystem identity of one service directory
///
/// Two observations of the same name refer to the same underlying directory
/// iff device and inode are equal; mtime and size are never consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub name: String,
    pub device: u64,
    pub inode: u64,
}

impl ServiceIdentity {
    /// The sole identity test: device and inode both match
    pub fn same_file(&self, other: &ServiceIdentity) -> bool {
        self.device == other.device && self.inode == other.inode
    }
}

/// State of the most recently completed poll, keyed by service name
pub type ServiceSnapshot = HashMap<String, ServiceIdentity>;

/// Events emitted by the Scanner
#[derive(Debug)]
pub enum ScanEvent {
    /// A service directory appeared
    Added(String),
    /// A service directory was replaced by one with a different identity
    Changed(String),
    /// A service directory disappeared
    Removed(String),
    /// Listing or an identity lookup failed; scanning continues
    Error(LogmuxError),
    /// The scanner stopped; always the last event
    Closed,
}

/// Handle to a running scanner task
pub struct Scanner {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Scanner {
    /// Start polling `root` every `poll_interval` and emit lifecycle events
    pub fn start<P: AsRef<Path>>(
        root: P,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let root = root.as_ref().to_path_buf();

        let task = tokio::spawn(scan_loop(root, poll_interval, tx, shutdown_rx));

        (
            Self {
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            rx,
        )
    }

    /// Cancel the pending poll; repeated calls have no effect
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the scanner task to finish
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        // A handle dropped without close() must not leave the task running
        if self.shutdown.is_some() {
            if let Some(task) = &self.task {
                task.abort();
            }
        }
    }
}

async fn scan_loop(
    root: PathBuf,
    poll_interval: Duration,
    tx: mpsc::Sender<ScanEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut snapshot = ServiceSnapshot::new();

    loop {
        // One full reconciliation pass. The snapshot is only replaced once
        // the pass has fully settled, so no partial update is ever visible.
        match scan_once(&root, &tx).await {
            Ok(current) => {
                for event in diff_snapshots(&snapshot, &current) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                snapshot = current;
            }
            Err(e) => {
                // A failed listing does not stop scanning
                if tx.send(ScanEvent::Error(e)).await.is_err() {
                    return;
                }
            }
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = sleep(poll_interval) => {}
        }
    }

    debug!(root = %root.display(), "scanner stopped");
    let _ = tx.send(ScanEvent::Closed).await;
}

/// One reconciliation pass: list the root, stat every non-dot entry, keep
/// the directories
async fn scan_once(root: &Path, tx: &mpsc::Sender<ScanEvent>) -> Result<ServiceSnapshot> {
    let mut entries = tokio::fs::read_dir(root).await.map_err(|e| {
        LogmuxError::DiscoveryError(format!("{}: {}", root.display(), e))
    })?;

    let mut names = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
            Ok(None) => break,
            Err(e) => {
                return Err(LogmuxError::DiscoveryError(format!(
                    "{}: {}",
                    root.display(),
                    e
                )))
            }
        }
    }

    // Identity lookups fan out and fully join before the diff step runs.
    // A failed entry is reported and dropped from this pass only.
    let mut lookups = JoinSet::new();
    for name in names {
        let path = root.join(&name);
        lookups.spawn(async move {
            let meta = tokio::fs::metadata(&path).await;
            (name, meta)
        });
    }

    let mut current = ServiceSnapshot::new();
    while let Some(joined) = lookups.join_next().await {
        let (name, meta) = match joined {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        match meta {
            Ok(meta) if meta.is_dir() => {
                current.insert(
                    name.clone(),
                    ServiceIdentity {
                        name,
                        device: meta.dev(),
                        inode: meta.ino(),
                    },
                );
            }
            // Plain files under the root are not services
            Ok(_) => {}
            Err(e) => {
                let _ = tx
                    .send(ScanEvent::Error(LogmuxError::StatError(
                        name,
                        e.to_string(),
                    )))
                    .await;
            }
        }
    }

    Ok(current)
}

/// Diff two snapshots; removals come first, then additions and changes in
/// current-snapshot iteration order
fn diff_snapshots(previous: &ServiceSnapshot, current: &ServiceSnapshot) -> Vec<ScanEvent> {
    let mut events = Vec::new();

    for name in previous.keys() {
        if !current.contains_key(name) {
            events.push(ScanEvent::Removed(name.clone()));
        }
    }

    for (name, identity) in current {
        match previous.get(name) {
            None => events.push(ScanEvent::Added(name.clone())),
            Some(prev) if !prev.same_file(identity) => events.push(ScanEvent::Changed(name.clone())),
            Some(_) => {}
        }
    }

    events
}
