//! Error types for the chunk server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Chunk build failed (missing or malformed source, I/O)
    #[error("Chunking error: {0}")]
    Chunking(#[from] thermal_chunking::ChunkingError),

    /// The blocking build task panicked or was cancelled
    #[error("Build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Requested dataset is not configured
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}
