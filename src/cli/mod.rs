// CLI module - User-facing command-line interface

use crate::config::Settings;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Logmux - multiplexes service logs under a root directory into one stream
#[derive(Parser)]
#[command(name = "logmux")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Root directory containing one subdirectory per service
    root_dir: Option<PathBuf>,

    /// Enable verbose internal logging
    #[arg(long)]
    debug: bool,

    /// Path to a settings file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Run the CLI application
    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute().await
    }

    /// Execute with the merged settings
    async fn execute(&self) -> Result<()> {
        init_logging(self.debug);

        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        if let Some(root_dir) = &self.root_dir {
            settings.root_dir = root_dir.clone();
        }
        settings.validate()?;

        let mut orchestrator = Orchestrator::new(settings);
        let closer = orchestrator.close_handle();

        // The first interrupt or termination signal triggers one graceful
        // close; this task exits after it, so later signals go nowhere.
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            closer.close();
        });

        orchestrator.run().await
    }
}

/// Route diagnostics to stderr so they never mix into the log stream
fn init_logging(debug: bool) {
    let default_filter = if debug { "logmux=debug" } else { "logmux=warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
