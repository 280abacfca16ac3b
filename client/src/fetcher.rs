//! Progressive chunk fetcher.
//!
//! A fetch runs as its own tokio task and reports to the consumer over a
//! bounded channel, so a slow consumer throttles the download instead of
//! letting rows pile up. Chunks are requested strictly in index order. The
//! assembled dataset is written to the raw cache only once every chunk has
//! arrived; a cancelled or failed fetch never persists anything.

use crate::config::FetcherConfig;
use crate::error::{FetchError, FetchResult};
use crate::http::ChunkClient;
use common::rows::to_csv;
use common::{FileType, Record};
use std::future::Future;
use std::sync::Arc;
use thermal_data_cache::ContentCache;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    FetchingMetadata,
    FetchingChunks,
    Assembling,
    Done,
    Error(String),
    Cancelled,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchState::Done | FetchState::Error(_) | FetchState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    State(FetchState),
    /// Percent complete, 0..=100
    Progress(u8),
    /// Interim rows; `first_index` is the position of `rows[0]` in the
    /// full dataset
    Rows { first_index: usize, rows: Vec<Record> },
}

/// A running fetch.
///
/// `events` must be drained (or dropped) for the task to make progress once
/// the channel fills up.
pub struct FetchHandle {
    pub events: mpsc::Receiver<FetchEvent>,
    pub join: JoinHandle<FetchResult<Vec<Record>>>,
}

impl FetchHandle {
    /// Discard remaining events and wait for the dataset.
    pub async fn finish(self) -> FetchResult<Vec<Record>> {
        let FetchHandle { mut events, join } = self;
        while events.recv().await.is_some() {}
        join.await.map_err(|e| FetchError::Task(e.to_string()))?
    }
}

/// Progress after chunk `index` (0-based) of `total` has been received.
pub fn chunk_progress(index: usize, total: usize) -> u8 {
    let fraction = (index + 1) as f64 / total.max(1) as f64;
    (10.0 + fraction * 80.0).round().min(90.0) as u8
}

#[derive(Clone)]
pub struct ProgressiveFetcher {
    client: ChunkClient,
    cache: Option<Arc<ContentCache>>,
}

impl ProgressiveFetcher {
    pub fn new(config: FetcherConfig, cache: Option<Arc<ContentCache>>) -> FetchResult<Self> {
        Ok(Self {
            client: ChunkClient::new(config)?,
            cache,
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        self.client.config()
    }

    /// Start fetching `file_type` in the background.
    ///
    /// The first event on the returned handle is always `State(Idle)`.
    pub fn spawn(&self, file_type: FileType, cancel: CancellationToken) -> FetchHandle {
        let (tx, events) = mpsc::channel(self.config().event_buffer.max(1));
        // A fresh channel always has room for the first event
        let _ = tx.try_send(FetchEvent::State(FetchState::Idle));
        let task = FetchTask {
            client: self.client.clone(),
            cache: self.cache.clone(),
            file_type,
            events: tx,
            cancel,
            interim_min_records: self.config().interim_min_records,
        };
        let join = tokio::spawn(task.run());
        FetchHandle { events, join }
    }

    /// Fetch `file_type` to completion, ignoring interim events.
    pub async fn fetch(&self, file_type: FileType, cancel: CancellationToken) -> FetchResult<Vec<Record>> {
        self.spawn(file_type, cancel).finish().await
    }
}

struct FetchTask {
    client: ChunkClient,
    cache: Option<Arc<ContentCache>>,
    file_type: FileType,
    events: mpsc::Sender<FetchEvent>,
    cancel: CancellationToken,
    interim_min_records: usize,
}

impl FetchTask {
    async fn run(self) -> FetchResult<Vec<Record>> {
        let result = self.drive().await;
        let terminal = match &result {
            Ok(_) => None,
            Err(FetchError::Cancelled) => {
                tracing::info!(file_type = %self.file_type, "Fetch cancelled");
                Some(FetchState::Cancelled)
            }
            Err(e) => {
                tracing::error!(file_type = %self.file_type, error = %e, "Fetch failed");
                Some(FetchState::Error(e.to_string()))
            }
        };
        if let Some(state) = terminal {
            // Consumer may have gone away
            let _ = self.events.send(FetchEvent::State(state)).await;
        }
        result
    }

    /// Await `fut` unless the fetch is cancelled first.
    async fn guarded<T>(&self, fut: impl Future<Output = FetchResult<T>>) -> FetchResult<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            out = fut => out,
        }
    }

    async fn emit(&self, event: FetchEvent) -> FetchResult<()> {
        self.guarded(async {
            // A dropped receiver only means nobody is watching
            let _ = self.events.send(event).await;
            Ok(())
        })
        .await
    }

    async fn drive(&self) -> FetchResult<Vec<Record>> {
        let file_type = &self.file_type;
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.emit(FetchEvent::State(FetchState::FetchingMetadata)).await?;
        let manifest = self.guarded(self.client.manifest(file_type)).await?;
        tracing::info!(
            %file_type,
            records = manifest.total_records,
            chunks = manifest.total_chunks,
            "Fetched manifest"
        );
        self.emit(FetchEvent::Progress(10)).await?;

        self.emit(FetchEvent::State(FetchState::FetchingChunks)).await?;
        let mut rows: Vec<Record> = Vec::with_capacity(manifest.total_records);
        let mut forwarded = 0;
        for descriptor in &manifest.chunks {
            let index = descriptor.index;
            let chunk = self.guarded(self.client.chunk(file_type, index)).await?;
            if chunk.len() != descriptor.record_count {
                return Err(FetchError::ChunkMismatch {
                    index,
                    expected: descriptor.record_count,
                    actual: chunk.len(),
                });
            }
            tracing::debug!(%file_type, chunk_index = index, records = chunk.len(), "Fetched chunk");
            rows.extend(chunk);

            self.emit(FetchEvent::Progress(chunk_progress(index, manifest.total_chunks)))
                .await?;

            if index == 0 || rows.len() - forwarded >= self.interim_min_records {
                self.forward(&rows, &mut forwarded).await?;
            }
        }
        if forwarded < rows.len() {
            self.forward(&rows, &mut forwarded).await?;
        }

        self.emit(FetchEvent::State(FetchState::Assembling)).await?;
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Some(cache) = &self.cache {
            let csv = to_csv(&rows)?;
            match cache.save_raw(file_type, &csv).await {
                Ok(()) => tracing::debug!(%file_type, bytes = csv.len(), "Stored raw dataset"),
                Err(e) => tracing::warn!(%file_type, error = %e, "Failed to store raw dataset"),
            }
        }

        self.emit(FetchEvent::Progress(100)).await?;
        self.emit(FetchEvent::State(FetchState::Done)).await?;
        tracing::info!(%file_type, records = rows.len(), "Fetch complete");
        Ok(rows)
    }

    async fn forward(&self, rows: &[Record], forwarded: &mut usize) -> FetchResult<()> {
        let first_index = *forwarded;
        let batch = rows[first_index..].to_vec();
        *forwarded = rows.len();
        self.emit(FetchEvent::Rows { first_index, rows: batch }).await
    }
}
