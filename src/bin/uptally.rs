use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use uptally::{Backend, config_path};

#[derive(Debug, Parser)]
#[command(name = "uptally", about = "Workload and node availability reports")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "UPTALLY_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Run a single aggregation pass, export it and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let backend = Backend::from_path(config_path(cli.config)).await?;
    info!(
        config = %backend.config_path.display(),
        interval_secs = backend.config.aggregation.interval_secs,
        "configuration loaded"
    );
    let aggregator = Arc::new(backend.aggregator()?);
    let cancel = CancellationToken::new();

    if cli.once {
        if aggregator.aggregate(&cancel).await.is_none() {
            bail!("no event log source could be read");
        }
        return Ok(());
    }

    tokio::spawn(watch_shutdown(cancel.clone()));

    let handle = {
        let aggregator = Arc::clone(&aggregator);
        let cancel = cancel.clone();
        tokio::spawn(async move { aggregator.start(cancel).await })
    };

    let result = handle.await.context("aggregator task panicked")?;
    if let Err(e) = &result {
        error!(error = %e, "aggregator stopped with an error");
    }
    info!(ready = aggregator.is_report_ready(), "aggregator stopped, exiting");
    result
}

async fn watch_shutdown(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
    cancel.cancel();
}
