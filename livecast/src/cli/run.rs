use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::{signal, sync::watch};

use crate::process::{ProcessRunner, SystemRunner};
use crate::supervisor::Supervisor;

use super::DEFAULT_CONFIG;

#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

impl Default for RunCommand {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG),
        }
    }
}

impl RunCommand {
    pub async fn run(self) -> Result<()> {
        let config = super::load_config(&self.config)?;
        crate::logging::init(&config.logging)?;

        for warning in &config.warnings {
            tracing::warn!("{warning}");
        }
        if config.metadata.is_none() {
            tracing::info!("AzuraCast not configured, metadata updates disabled");
        }

        // Shutdown signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(name) => tracing::info!(signal = name, "shutting down"),
                Err(e) => tracing::error!(error = %e, "failed to listen for signals, shutting down"),
            }
            let _ = shutdown_tx.send(true);
        });

        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner::new());
        let mut supervisor = Supervisor::new(&config, runner);
        let stats = supervisor.run(shutdown_rx).await;

        tracing::info!(
            probes = stats.probes,
            sessions = stats.starts,
            start_failures = stats.start_failures,
            metadata_failures = stats.metadata_failures,
            "done"
        );
        Ok(())
    }
}

/// Wait for SIGINT, or SIGTERM on unix, and name the one that arrived.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}
