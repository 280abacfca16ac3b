//! Thermal chunk server
//!
//! Splits the configured CSV datasets into chunk artifacts at startup and on a
//! schedule, and serves manifests, chunks and the legacy export over HTTP.

use anyhow::Result;
use clap::Parser;
use thermal_server::{CliArgs, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "thermal_server=info,thermal_api=info,thermal_chunking=info,tower_http=debug".into()
            }),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    let config = ServerConfig::load(&args)?;

    info!("Starting thermal-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.data.data_dir.display());
    info!("Chunks directory: {}", config.chunks_dir().display());
    info!(
        chunk_size = config.data.chunk_size,
        datasets = config.datasets.len(),
        "Chunking configuration"
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        on_signal.cancel();
    });

    thermal_server::run(config, args.skip_initial_build, shutdown).await
}
