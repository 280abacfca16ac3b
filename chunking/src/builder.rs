use crate::error::{ChunkingError, Result};
use common::models::{chunk_file_name, manifest_file_name, ChunkDescriptor, DEFAULT_CHUNK_SIZE};
use common::rows::RecordReader;
use common::{FileType, Manifest, Record};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Returns true when `name` is a chunk artifact of exactly `file_type`.
///
/// Matches `{fileType}-chunk-{digits}.json` only, so `steady-state` does not
/// claim `steady-state-extra-chunk-0.json`.
pub fn is_chunk_artifact(name: &str, file_type: &FileType) -> bool {
    let Some(rest) = name
        .strip_prefix(file_type.as_str())
        .and_then(|r| r.strip_prefix("-chunk-"))
        .and_then(|r| r.strip_suffix(".json"))
    else {
        return false;
    };
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Returns true for the hidden `.{name}.tmp` files a build writes before
/// renaming them into place.
fn is_temp_artifact(name: &str, file_type: &FileType) -> bool {
    name.strip_prefix('.')
        .and_then(|r| r.strip_suffix(".tmp"))
        .is_some_and(|inner| inner == manifest_file_name(file_type) || is_chunk_artifact(inner, file_type))
}

fn temp_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!(".{file_name}.tmp"))
}

/// Rebuilds the chunk artifacts of one dataset at a time.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    chunks_dir: PathBuf,
    chunk_size: usize,
}

impl ChunkBuilder {
    pub fn new(chunks_dir: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize(chunk_size));
        }
        Ok(Self {
            chunks_dir: chunks_dir.into(),
            chunk_size,
        })
    }

    /// Builder with the default chunk size of 5000 records.
    pub fn with_default_size(chunks_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunks_dir: chunks_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunks_dir(&self) -> &Path {
        &self.chunks_dir
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Replace every artifact of `file_type` with a fresh chunking of `source`.
    ///
    /// Old chunks and the manifest are removed first. Records are streamed
    /// from the source and buffered only up to one chunk. The manifest is
    /// written last, so its presence means every chunk it lists exists.
    pub fn build(&self, source: &Path, file_type: &FileType) -> Result<Manifest> {
        common::platform::ensure_directory(&self.chunks_dir)?;

        let removed = self.remove_artifacts(file_type)?;
        if removed > 0 {
            tracing::debug!(file_type = %file_type, removed, "Removed previous chunk artifacts");
        }

        match self.write_chunks(source, file_type) {
            Ok(manifest) => {
                tracing::info!(
                    file_type = %file_type,
                    records = manifest.total_records,
                    chunks = manifest.total_chunks,
                    chunk_size = manifest.chunk_size,
                    "Chunking complete"
                );
                Ok(manifest)
            }
            Err(e) => {
                // Leave nothing half-written behind.
                if let Err(cleanup) = self.remove_artifacts(file_type) {
                    tracing::warn!(file_type = %file_type, error = %cleanup, "Failed to clean up partial chunks");
                }
                Err(e)
            }
        }
    }

    /// Delete every chunk file and the manifest of `file_type`, including
    /// temp files left by an interrupted build.
    ///
    /// Returns the number of files removed.
    pub fn remove_artifacts(&self, file_type: &FileType) -> Result<usize> {
        let entries = match fs::read_dir(&self.chunks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let manifest_name = manifest_file_name(file_type);
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == manifest_name || is_chunk_artifact(name, file_type) || is_temp_artifact(name, file_type) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_chunks(&self, source: &Path, file_type: &FileType) -> Result<Manifest> {
        let file = File::open(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ChunkingError::SourceNotFound(source.to_path_buf()),
            _ => ChunkingError::Io(e),
        })?;
        let total_size = file.metadata()?.len();

        let reader = RecordReader::new(BufReader::new(file))?;
        let mut buffer: Vec<Record> = Vec::with_capacity(self.chunk_size);
        let mut chunks = Vec::new();
        let mut total_records = 0usize;

        for record in reader {
            buffer.push(record?);
            if buffer.len() == self.chunk_size {
                chunks.push(self.flush_chunk(file_type, chunks.len(), total_records, &buffer)?);
                total_records += buffer.len();
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            chunks.push(self.flush_chunk(file_type, chunks.len(), total_records, &buffer)?);
            total_records += buffer.len();
        }

        let manifest = Manifest {
            file_type: file_type.clone(),
            total_size,
            total_records,
            total_chunks: chunks.len(),
            chunk_size: self.chunk_size,
            last_modified: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            chunks,
        };
        manifest.validate()?;

        self.write_manifest(&manifest)?;
        Ok(manifest)
    }

    fn flush_chunk(
        &self,
        file_type: &FileType,
        index: usize,
        start_record: usize,
        records: &[Record],
    ) -> Result<ChunkDescriptor> {
        let file_name = chunk_file_name(file_type, index);
        let temp = temp_path(&self.chunks_dir, &file_name);
        let mut writer = BufWriter::new(File::create(&temp)?);
        serde_json::to_writer(&mut writer, records)?;
        writer.flush()?;
        drop(writer);
        // Readers only ever see a complete chunk under the final name
        fs::rename(&temp, self.chunks_dir.join(&file_name))?;

        tracing::debug!(file_type = %file_type, chunk_index = index, records = records.len(), "Wrote chunk");

        Ok(ChunkDescriptor {
            index,
            file_name,
            record_count: records.len(),
            start_record,
            end_record: start_record + records.len() - 1,
        })
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let file_name = manifest_file_name(&manifest.file_type);
        let temp = temp_path(&self.chunks_dir, &file_name);

        let bytes = serde_json::to_vec_pretty(manifest)?;
        fs::write(&temp, bytes)?;
        fs::rename(&temp, self.chunks_dir.join(&file_name))?;
        Ok(())
    }
}
