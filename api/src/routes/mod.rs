//! Route handlers.
//!
//! Dataset resources are addressed by suffix on a single path segment:
//! - `/{fileType}-data-metadata` for the manifest
//! - `/{fileType}-data/{chunkIndex}` for one chunk
//! - `/{fileType}-data` for the legacy whole-file export

pub mod data;
pub mod health;

use crate::error::{ApiError, ApiResult};
use common::FileType;

const METADATA_SUFFIX: &str = "-data-metadata";
const DATA_SUFFIX: &str = "-data";

/// A single-segment dataset resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Metadata(FileType),
    Export(FileType),
}

impl Resource {
    /// Classify `/{segment}`.
    ///
    /// Unknown shapes are `NotFound`; a recognised shape whose prefix is not a
    /// valid file type is `BadRequest`.
    pub fn classify(segment: &str) -> ApiResult<Self> {
        if let Some(prefix) = segment.strip_suffix(METADATA_SUFFIX) {
            return Ok(Self::Metadata(parse_file_type(prefix)?));
        }
        if let Some(prefix) = segment.strip_suffix(DATA_SUFFIX) {
            return Ok(Self::Export(parse_file_type(prefix)?));
        }
        Err(ApiError::NotFound(format!("No resource at /{}", segment)))
    }
}

/// File type of a `/{fileType}-data/{n}` chunk collection segment.
pub fn chunk_collection(segment: &str) -> ApiResult<FileType> {
    match segment.strip_suffix(DATA_SUFFIX) {
        Some(prefix) => parse_file_type(prefix),
        None => Err(ApiError::NotFound(format!("No chunk collection at /{}", segment))),
    }
}

/// Parse a chunk index: a plain non-negative decimal integer.
pub fn parse_chunk_index(text: &str) -> ApiResult<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::BadRequest(format!(
            "Chunk index must be a non-negative integer, got '{}'",
            text
        )));
    }
    text.parse()
        .map_err(|_| ApiError::BadRequest(format!("Chunk index '{}' is out of range", text)))
}

fn parse_file_type(prefix: &str) -> ApiResult<FileType> {
    FileType::new(prefix).map_err(|e| ApiError::BadRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ft(tag: &str) -> FileType {
        FileType::new(tag).unwrap()
    }

    #[test]
    fn test_classify_metadata_before_export() {
        assert_eq!(
            Resource::classify("steady-state-data-metadata").unwrap(),
            Resource::Metadata(ft("steady-state"))
        );
        assert_eq!(
            Resource::classify("clustering-data").unwrap(),
            Resource::Export(ft("clustering"))
        );
    }

    #[test]
    fn test_classify_rejects_unknown_and_invalid() {
        assert!(matches!(Resource::classify("favicon.ico"), Err(ApiError::NotFound(_))));
        assert!(matches!(Resource::classify("-data"), Err(ApiError::BadRequest(_))));
        assert!(matches!(Resource::classify("a.b-data"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_chunk_collection() {
        assert_eq!(chunk_collection("clustering-data").unwrap(), ft("clustering"));
        assert!(matches!(
            chunk_collection("clustering-data-metadata"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_chunk_index() {
        assert_eq!(parse_chunk_index("0").unwrap(), 0);
        assert_eq!(parse_chunk_index("42").unwrap(), 42);
        for bad in ["", "-1", "+1", "1.5", "abc", "99999999999999999999999"] {
            assert!(matches!(parse_chunk_index(bad), Err(ApiError::BadRequest(_))), "{bad}");
        }
    }
}
