use crate::error::Result;
use common::models::{chunk_file_name, manifest_file_name};
use common::{FileType, Manifest, Record};
use std::io;
use std::path::{Path, PathBuf};

/// Read-only view over a chunks directory.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunks_dir: PathBuf,
}

impl ChunkStore {
    pub fn new(chunks_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunks_dir: chunks_dir.into(),
        }
    }

    pub fn chunks_dir(&self) -> &Path {
        &self.chunks_dir
    }

    /// Manifest of `file_type`, or `None` if chunking never completed.
    pub async fn read_manifest(&self, file_type: &FileType) -> Result<Option<Manifest>> {
        let path = self.chunks_dir.join(manifest_file_name(file_type));
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Stored JSON bytes of chunk `index`.
    ///
    /// `None` when the manifest is missing, `index` is outside
    /// `[0, totalChunks)`, or the artifact itself is gone.
    pub async fn read_chunk_bytes(&self, file_type: &FileType, index: usize) -> Result<Option<Vec<u8>>> {
        let Some(manifest) = self.read_manifest(file_type).await? else {
            return Ok(None);
        };
        if index >= manifest.total_chunks {
            return Ok(None);
        }
        read_optional(&self.chunks_dir.join(chunk_file_name(file_type, index))).await
    }

    /// Parsed records of chunk `index`.
    pub async fn read_chunk(&self, file_type: &FileType, index: usize) -> Result<Option<Vec<Record>>> {
        match self.read_chunk_bytes(file_type, index).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
