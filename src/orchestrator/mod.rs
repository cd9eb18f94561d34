// Orchestrator module - binds scanner events to per-service log followers

use crate::config::Settings;
use crate::error::{LogmuxError, Result};
use crate::follow::{FollowEvent, FollowOptions, LineFollower};
use crate::scanner::{ScanEvent, Scanner};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Notify};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Relative path of the followed log file inside each service directory
const SERVICE_LOG_PATH: &str = "log/main/current";

/// Width of the timestamp token at the head of an svlogd-style line,
/// including the leading `@`
const TIMESTAMP_LEN: usize = 25;

/// One live follower bound to a service name
struct ActiveFollower {
    generation: u64,
    follower: LineFollower,
    relay: tokio::task::JoinHandle<()>,
}

/// Message relayed from a follower task into the orchestrator loop
struct FollowerMessage {
    service: String,
    generation: u64,
    event: FollowEvent,
}

/// Where formatted lines are written
enum OutputSink {
    Stdout(tokio::io::Stdout),
    Channel(mpsc::Sender<String>),
}

/// Requests a running orchestrator to shut down; safe to call from any task
/// and any state, any number of times
#[derive(Clone)]
pub struct CloseHandle {
    notify: Arc<Notify>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.notify.notify_one();
    }
}

/// Keeps exactly one active log follower per live service and turns their
/// lines into one prefixed output stream
pub struct Orchestrator {
    settings: Settings,
    followers: HashMap<String, ActiveFollower>,
    follower_tx: mpsc::Sender<FollowerMessage>,
    follower_rx: Option<mpsc::Receiver<FollowerMessage>>,
    output: OutputSink,
    shutdown: Arc<Notify>,
    next_generation: u64,
}

impl Orchestrator {
    /// Create an orchestrator that writes formatted lines to stdout
    pub fn new(settings: Settings) -> Self {
        Self::with_output(settings, OutputSink::Stdout(tokio::io::stdout()))
    }

    /// Create an orchestrator that sends formatted lines to a channel
    /// instead of stdout
    pub fn with_channel(settings: Settings) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(256);
        (Self::with_output(settings, OutputSink::Channel(tx)), rx)
    }

    fn with_output(settings: Settings, output: OutputSink) -> Self {
        let (follower_tx, follower_rx) = mpsc::channel(256);
        Self {
            settings,
            followers: HashMap::new(),
            follower_tx,
            follower_rx: Some(follower_rx),
            output,
            shutdown: Arc::new(Notify::new()),
            next_generation: 0,
        }
    }

    /// Handle used to request a graceful shutdown
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            notify: self.shutdown.clone(),
        }
    }

    /// Number of currently active followers
    pub fn active_followers(&self) -> usize {
        self.followers.len()
    }

    /// Run until closed
    ///
    /// Fails fast when the root directory is unusable at launch; once
    /// running, every failure is reported and survived.
    pub async fn run(&mut self) -> Result<()> {
        let root = self.settings.root_dir.clone();
        let meta = tokio::fs::metadata(&root).await.map_err(|e| {
            LogmuxError::RootUnusable(root.display().to_string(), e.to_string())
        })?;
        if !meta.is_dir() {
            return Err(LogmuxError::RootUnusable(
                root.display().to_string(),
                "not a directory".to_string(),
            ));
        }

        let mut follower_rx = match self.follower_rx.take() {
            Some(rx) => rx,
            None => {
                return Err(LogmuxError::Internal(
                    "orchestrator already ran".to_string(),
                ))
            }
        };

        let (mut scanner, mut scan_events) = Scanner::start(
            &root,
            Duration::from_millis(self.settings.poll_interval_ms),
        );
        let shutdown = self.shutdown.clone();
        info!(root = %root.display(), "watching service directories");

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                event = scan_events.recv() => match event {
                    Some(event) => self.handle_scan_event(event).await,
                    None => break,
                },
                message = follower_rx.recv() => {
                    if let Some(message) = message {
                        self.handle_follower_message(message).await;
                    }
                }
            }
        }

        // Teardown: scanner first, then every follower. Receivers are
        // dropped before the joins so a task blocked mid-send cannot stall
        // them.
        scanner.close();
        drop(scan_events);
        scanner.join().await;
        drop(follower_rx);
        for (name, mut active) in self.followers.drain() {
            debug!(service = %name, "closing follower");
            active.follower.close();
            active.follower.join().await;
            let _ = active.relay.await;
        }

        info!("orchestrator closed");
        Ok(())
    }

    async fn handle_scan_event(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Added(name) => {
                debug!(service = %name, "service added");
                self.open_follower(name);
            }
            ScanEvent::Changed(name) => {
                // The log file was replaced; the old follower still points
                // at the old identity. Close it before opening the new one.
                debug!(service = %name, "service replaced");
                self.close_follower(&name);
                self.open_follower(name);
            }
            ScanEvent::Removed(name) => {
                debug!(service = %name, "service removed");
                self.close_follower(&name);
            }
            ScanEvent::Error(e) => warn!("scan error: {}", e),
            ScanEvent::Closed => debug!("scanner closed"),
        }
    }

    /// Open a follower for a service and register its relay under the next
    /// generation number
    fn open_follower(&mut self, name: String) {
        let path = self
            .settings
            .root_dir
            .join(&name)
            .join(SERVICE_LOG_PATH);
        let generation = self.next_generation;
        self.next_generation += 1;

        let options = FollowOptions {
            tail_lines: self.settings.tail_lines,
            source: self.settings.follow_source,
            ..FollowOptions::default()
        };
        let (follower, mut events) = LineFollower::open(path, options);

        let tx = self.follower_tx.clone();
        let service = name.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let message = FollowerMessage {
                    service: service.clone(),
                    generation,
                    event,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        self.followers.insert(
            name,
            ActiveFollower {
                generation,
                follower,
                relay,
            },
        );
    }

    /// Close and forget the follower for a service, if any
    ///
    /// The follow task finishes on its own after the close request; its
    /// remaining messages carry a stale generation and are discarded.
    fn close_follower(&mut self, name: &str) {
        if let Some(mut active) = self.followers.remove(name) {
            active.follower.close();
        }
    }

    async fn handle_follower_message(&mut self, message: FollowerMessage) {
        let current = self
            .followers
            .get(&message.service)
            .map(|active| active.generation);
        if current != Some(message.generation) {
            // In-flight event from a follower that was already replaced or
            // removed
            return;
        }

        match message.event {
            FollowEvent::Line(line) => {
                let formatted = format_line(&message.service, &line);
                self.emit(formatted).await;
            }
            FollowEvent::Error(e) => {
                // The service stays silent until a later change or removal
                // recreates or drops its follower
                warn!(service = %message.service, "follow error: {}", e);
            }
            FollowEvent::Closed => {
                debug!(service = %message.service, "follower closed");
            }
        }
    }

    async fn emit(&mut self, line: String) {
        match &mut self.output {
            OutputSink::Stdout(out) => {
                let mut data = line.into_bytes();
                data.push(b'\n');
                if let Err(e) = out.write_all(&data).await {
                    warn!("failed to write output: {}", e);
                    return;
                }
                let _ = out.flush().await;
            }
            OutputSink::Channel(tx) => {
                let _ = tx.send(line).await;
            }
        }
    }
}

/// Prefix a decoded line with its service name
///
/// An svlogd-style line starts with a 25-character `@…` timestamp token;
/// the token is lifted in front of the prefix. Trailing whitespace,
/// including the newline the decoder kept, is trimmed.
pub fn format_line(service: &str, line: &str) -> String {
    let line = line.trim_end();
    if line.starts_with('@') {
        if let Some(timestamp) = line.get(..TIMESTAMP_LEN) {
            let rest = &line[TIMESTAMP_LEN..];
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            return format!("{} {}: {}", timestamp, service, rest);
        }
    }
    format!("{}: {}", service, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain_line() {
        assert_eq!(format_line("web", "hello\n"), "web: hello");
    }

    #[test]
    fn test_format_trims_trailing_whitespace() {
        assert_eq!(format_line("web", "hello   \r\n"), "web: hello");
    }

    #[test]
    fn test_format_timestamp_line() {
        assert_eq!(
            format_line("web", "@2024-01-01T00:00:00.000Z hello\n"),
            "@2024-01-01T00:00:00.000Z web: hello"
        );
    }

    #[test]
    fn test_format_final_fragment_without_newline() {
        assert_eq!(format_line("web", "world"), "web: world");
    }

    #[test]
    fn test_format_short_at_line_falls_back_to_plain() {
        assert_eq!(format_line("web", "@short\n"), "web: @short");
    }

    #[test]
    fn test_format_timestamp_only_line() {
        assert_eq!(
            format_line("web", "@2024-01-01T00:00:00.000Z\n"),
            "@2024-01-01T00:00:00.000Z web: "
        );
    }
}
