//! Startup and scheduled chunk rebuilds.
//!
//! Builds run on the blocking pool. Rebuilds of one file type are serialized
//! through a per-type lock, so a scheduled rebuild never interleaves its
//! deletes and writes with another rebuild of the same dataset.

use crate::config::{DatasetConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use common::{FileType, Manifest};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thermal_chunking::ChunkBuilder;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of rebuilding every configured dataset.
#[derive(Debug, Default)]
pub struct RebuildSummary {
    pub built: Vec<Manifest>,
    pub failed: Vec<(FileType, String)>,
}

pub struct Rebuilder {
    builder: ChunkBuilder,
    datasets: Vec<(FileType, PathBuf)>,
    locks: DashMap<FileType, Arc<Mutex<()>>>,
}

impl Rebuilder {
    pub fn new(builder: ChunkBuilder, datasets: Vec<(FileType, PathBuf)>) -> Self {
        Self {
            builder,
            datasets,
            locks: DashMap::new(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let builder = ChunkBuilder::new(config.chunks_dir(), config.data.chunk_size)?;
        let datasets = config
            .datasets
            .iter()
            .map(|d: &DatasetConfig| (d.file_type.clone(), config.source_path(d)))
            .collect();
        Ok(Self::new(builder, datasets))
    }

    /// Rebuild one configured dataset.
    pub async fn rebuild(&self, file_type: &FileType) -> ServerResult<Manifest> {
        let source = self
            .datasets
            .iter()
            .find(|(ft, _)| ft == file_type)
            .map(|(_, source)| source.clone())
            .ok_or_else(|| ServerError::UnknownDataset(file_type.to_string()))?;

        let lock = self
            .locks
            .entry(file_type.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        tracing::info!(file_type = %file_type, source = %source.display(), "Rebuilding chunks");

        let builder = self.builder.clone();
        let file_type = file_type.clone();
        let manifest = tokio::task::spawn_blocking(move || builder.build(&source, &file_type)).await??;
        Ok(manifest)
    }

    /// Rebuild every configured dataset. Failures are logged and collected;
    /// one bad source never stops the others.
    pub async fn rebuild_all(&self) -> RebuildSummary {
        let mut summary = RebuildSummary::default();
        for (file_type, _) in &self.datasets {
            match self.rebuild(file_type).await {
                Ok(manifest) => summary.built.push(manifest),
                Err(e) => {
                    tracing::error!(file_type = %file_type, error = %e, "Chunk rebuild failed");
                    summary.failed.push((file_type.clone(), e.to_string()));
                }
            }
        }
        summary
    }

    /// Rebuild everything every `period` until `cancel` fires.
    ///
    /// The first rebuild happens one full period after the call.
    pub fn spawn_periodic(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Scheduled rebuild task stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let summary = self.rebuild_all().await;
                        tracing::info!(
                            built = summary.built.len(),
                            failed = summary.failed.len(),
                            "Scheduled rebuild finished"
                        );
                    }
                }
            }
        })
    }
}
