//! Data models for chunked datasets.
//!
//! A dataset is split into fixed-size chunks on the server. The manifest
//! describes the partition so a client can fetch every chunk in order and
//! know up front how much data to expect.

use crate::{DataError, DataResult, FileType};
use serde::{Deserialize, Serialize};

/// One row of a dataset: column header -> cell value, in source column order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Default number of records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// File name of chunk `index` for `file_type`.
pub fn chunk_file_name(file_type: &FileType, index: usize) -> String {
    format!("{}-chunk-{}.json", file_type, index)
}

/// File name of the manifest for `file_type`.
pub fn manifest_file_name(file_type: &FileType) -> String {
    format!("{}-metadata.json", file_type)
}

/// Number of chunks needed for `total_records` at `chunk_size` (ceiling division).
pub fn expected_chunks(total_records: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    total_records.div_ceil(chunk_size)
}

/// Position of one chunk within a dataset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    pub index: usize,
    pub file_name: String,
    pub record_count: usize,
    /// Global index of the first record in this chunk.
    pub start_record: usize,
    /// Global index of the last record in this chunk (inclusive).
    pub end_record: usize,
}

impl ChunkDescriptor {
    /// Descriptor for chunk `index` of a dataset with `total_records` rows.
    ///
    /// Returns `None` when `index` lies past the last chunk.
    pub fn for_index(
        file_type: &FileType,
        index: usize,
        chunk_size: usize,
        total_records: usize,
    ) -> Option<Self> {
        if index >= expected_chunks(total_records, chunk_size) {
            return None;
        }
        let start_record = index * chunk_size;
        let end_exclusive = (index + 1).saturating_mul(chunk_size).min(total_records);
        Some(Self {
            index,
            file_name: chunk_file_name(file_type, index),
            record_count: end_exclusive - start_record,
            start_record,
            end_record: end_exclusive - 1,
        })
    }
}

/// Describes how one dataset was partitioned into chunks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub file_type: FileType,
    /// Size in bytes of the source file at build time.
    pub total_size: u64,
    pub total_records: usize,
    pub total_chunks: usize,
    pub chunk_size: usize,
    /// RFC 3339 timestamp of the build.
    pub last_modified: String,
    pub chunks: Vec<ChunkDescriptor>,
}

impl Manifest {
    /// Compute the full partition of `total_records` rows.
    pub fn plan(
        file_type: FileType,
        total_size: u64,
        total_records: usize,
        chunk_size: usize,
        last_modified: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let total_chunks = expected_chunks(total_records, chunk_size);
        let chunks = (0..total_chunks)
            .filter_map(|i| ChunkDescriptor::for_index(&file_type, i, chunk_size, total_records))
            .collect();
        Self {
            file_type,
            total_size,
            total_records,
            total_chunks,
            chunk_size,
            last_modified: last_modified.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            chunks,
        }
    }

    /// Check the partition invariants.
    ///
    /// `totalChunks` must be the ceiling of `totalRecords / chunkSize`, and
    /// every descriptor must cover exactly the contiguous range its index
    /// implies.
    pub fn validate(&self) -> DataResult<()> {
        if self.chunk_size == 0 {
            return Err(DataError::InvalidManifest("chunkSize must be at least 1".into()));
        }
        let expected = expected_chunks(self.total_records, self.chunk_size);
        if self.total_chunks != expected {
            return Err(DataError::InvalidManifest(format!(
                "totalChunks is {} but {} records at chunkSize {} need {}",
                self.total_chunks, self.total_records, self.chunk_size, expected
            )));
        }
        if self.chunks.len() != self.total_chunks {
            return Err(DataError::InvalidManifest(format!(
                "{} chunk descriptors listed for {} chunks",
                self.chunks.len(),
                self.total_chunks
            )));
        }

        let mut next_start = 0usize;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.index != i {
                return Err(DataError::InvalidManifest(format!(
                    "descriptor at position {} has index {}",
                    i, chunk.index
                )));
            }
            let start = i.checked_mul(self.chunk_size).ok_or_else(|| {
                DataError::InvalidManifest(format!("chunk {} start overflows at chunkSize {}", i, self.chunk_size))
            })?;
            let end = (i + 1).saturating_mul(self.chunk_size).min(self.total_records) - 1;
            if chunk.start_record != next_start
                || chunk.start_record != start
                || chunk.end_record != end
                || chunk.record_count != end + 1 - chunk.start_record
            {
                return Err(DataError::InvalidManifest(format!(
                    "chunk {} covers [{}, {}] with {} records, expected [{}, {}]",
                    i, chunk.start_record, chunk.end_record, chunk.record_count, start, end
                )));
            }
            next_start = chunk.end_record + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ft(tag: &str) -> FileType {
        FileType::new(tag).unwrap()
    }

    fn fixed_time() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()
    }

    #[test]
    fn test_plan_12000_records_at_5000() {
        let manifest = Manifest::plan(ft("steady-state"), 1024, 12000, 5000, fixed_time());

        assert_eq!(manifest.total_chunks, 3);
        let counts: Vec<_> = manifest.chunks.iter().map(|c| c.record_count).collect();
        assert_eq!(counts, vec![5000, 5000, 2000]);
        let ranges: Vec<_> = manifest
            .chunks
            .iter()
            .map(|c| (c.start_record, c.end_record))
            .collect();
        assert_eq!(ranges, vec![(0, 4999), (5000, 9999), (10000, 11999)]);
        assert_eq!(manifest.chunks[2].file_name, "steady-state-chunk-2.json");
        manifest.validate().unwrap();
    }

    #[test]
    fn test_plan_empty_dataset() {
        let manifest = Manifest::plan(ft("clustering"), 0, 0, 5000, fixed_time());
        assert_eq!(manifest.total_chunks, 0);
        assert!(manifest.chunks.is_empty());
        manifest.validate().unwrap();
    }

    #[test]
    fn test_manifest_json_is_camel_case() {
        let manifest = Manifest::plan(ft("clustering"), 10, 3, 2, fixed_time());
        let json = serde_json::to_value(&manifest).unwrap();

        assert_eq!(json["fileType"], "clustering");
        assert_eq!(json["totalRecords"], 3);
        assert_eq!(json["totalChunks"], 2);
        assert_eq!(json["chunkSize"], 2);
        assert_eq!(json["lastModified"], "2024-05-01T03:00:00.000Z");
        assert_eq!(json["chunks"][1]["fileName"], "clustering-chunk-1.json");
        assert_eq!(json["chunks"][1]["startRecord"], 2);
        assert_eq!(json["chunks"][1]["endRecord"], 2);
        assert_eq!(json["chunks"][1]["recordCount"], 1);
    }

    #[test]
    fn test_validate_rejects_wrong_chunk_count() {
        let mut manifest = Manifest::plan(ft("clustering"), 10, 10, 4, fixed_time());
        manifest.total_chunks = 2;
        assert!(matches!(manifest.validate(), Err(DataError::InvalidManifest(_))));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut manifest = Manifest::plan(ft("clustering"), 10, 10, 4, fixed_time());
        manifest.chunks[1].start_record += 1;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_huge_chunk_size_does_not_overflow() {
        let chunk_size = usize::MAX / 2 + 1;
        let manifest = Manifest::plan(ft("clustering"), 0, usize::MAX, chunk_size, fixed_time());
        assert_eq!(manifest.total_chunks, 2);
        assert_eq!(manifest.chunks[1].end_record, usize::MAX - 1);
        manifest.validate().unwrap();

        let mut forged = manifest.clone();
        forged.chunks[1].start_record = 0;
        assert!(matches!(forged.validate(), Err(DataError::InvalidManifest(_))));
    }

    #[test]
    fn test_descriptor_past_end_is_none() {
        assert!(ChunkDescriptor::for_index(&ft("a"), 3, 5, 15).is_none());
        assert!(ChunkDescriptor::for_index(&ft("a"), 2, 5, 15).is_some());
    }
}
