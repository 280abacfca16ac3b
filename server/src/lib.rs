//! Chunk server library.
//!
//! Wires configuration, chunk rebuilds and the HTTP API together. The binary
//! in `main.rs` is a thin shell over [`run`].

pub mod config;
pub mod error;
pub mod rebuild;

pub use config::{CliArgs, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use rebuild::{RebuildSummary, Rebuilder};

use std::collections::HashMap;
use std::sync::Arc;
use thermal_api::AppState;
use thermal_chunking::ChunkStore;
use tokio_util::sync::CancellationToken;

/// Handler state for a configuration.
pub fn app_state(config: &ServerConfig) -> AppState {
    let sources: HashMap<_, _> = config
        .datasets
        .iter()
        .map(|d| (d.file_type.clone(), config.source_path(d)))
        .collect();
    AppState::new(ChunkStore::new(config.chunks_dir()), sources)
}

/// Build (unless skipped), start the rebuild schedule, then serve until
/// `shutdown` fires or the listener fails.
pub async fn run(config: ServerConfig, skip_initial_build: bool, shutdown: CancellationToken) -> anyhow::Result<()> {
    common::platform::ensure_directory(&config.chunks_dir())?;
    let rebuilder = Arc::new(Rebuilder::from_config(&config)?);

    if skip_initial_build {
        tracing::info!("Skipping initial chunk build");
    } else {
        let summary = rebuilder.rebuild_all().await;
        tracing::info!(
            built = summary.built.len(),
            failed = summary.failed.len(),
            "Initial chunk build finished"
        );
    }

    let schedule = config
        .rebuild_interval()
        .map(|period| rebuilder.clone().spawn_periodic(period, shutdown.child_token()));

    let state = app_state(&config);
    let result = tokio::select! {
        res = thermal_api::run_server_with_config(state, config.api_config()) => res,
        _ = shutdown.cancelled() => {
            tracing::info!("Shutdown requested");
            Ok(())
        }
    };

    shutdown.cancel();
    if let Some(handle) = schedule {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Rebuild schedule ended abnormally");
        }
    }
    result
}
