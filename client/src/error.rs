use crate::single_flight::FlightError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("chunk {index} unavailable: {reason}")]
    ChunkUnavailable { index: usize, reason: String },

    #[error("chunk {index} has {actual} records, manifest lists {expected}")]
    ChunkMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("fetch cancelled")]
    Cancelled,

    #[error("failed to assemble rows: {0}")]
    Assembly(#[from] common::DataError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("fetch task failed: {0}")]
    Task(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Another load of the same key failed; only its message is shared.
    #[error("shared load failed: {0}")]
    SharedFailure(String),

    /// The load this call was waiting on was cancelled or dropped.
    #[error("shared load was abandoned")]
    Abandoned,

    #[error("load cancelled")]
    Cancelled,

    #[error("view value could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<FlightError> for CoordinatorError {
    fn from(err: FlightError) -> Self {
        match err {
            FlightError::Failed(msg) => CoordinatorError::SharedFailure(msg),
            FlightError::Abandoned => CoordinatorError::Abandoned,
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
