//! Chunked dataset artifacts.
//!
//! [`ChunkBuilder`] turns a CSV source into `{fileType}-chunk-{i}.json`
//! arrays plus a `{fileType}-metadata.json` manifest. [`ChunkStore`] reads
//! them back for the HTTP layer.

pub mod builder;
pub mod error;
pub mod store;

pub use builder::{is_chunk_artifact, ChunkBuilder};
pub use error::{ChunkingError, Result};
pub use store::ChunkStore;
