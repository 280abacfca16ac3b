use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Chunk size must be at least 1, got {0}")]
    InvalidChunkSize(usize),

    #[error("Malformed source data: {0}")]
    Data(#[from] common::DataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChunkingError>;
