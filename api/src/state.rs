//! Shared handler state.

use common::FileType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thermal_chunking::ChunkStore;

/// State handed to every handler.
///
/// Cloning is cheap: the source table is shared.
#[derive(Debug, Clone)]
pub struct AppState {
    store: ChunkStore,
    sources: Arc<HashMap<FileType, PathBuf>>,
}

impl AppState {
    /// `sources` maps each served file type to its CSV on disk, used by the
    /// legacy whole-file export.
    pub fn new(store: ChunkStore, sources: HashMap<FileType, PathBuf>) -> Self {
        Self {
            store,
            sources: Arc::new(sources),
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn source_path(&self, file_type: &FileType) -> Option<&Path> {
        self.sources.get(file_type).map(PathBuf::as_path)
    }
}
