//! Common types shared by the chunk server and the client crates.
//!
//! # Architecture
//!
//! The `common` crate sits at the bottom of the dependency hierarchy:
//! - Has NO dependencies on other workspace crates
//! - Defines the dataset vocabulary (`FileType`, `Record`, `Manifest`)
//! - Owns the canonical CSV row codec so server and client agree on it

pub mod models;
pub mod platform;
pub mod rows;

pub use models::{ChunkDescriptor, Manifest, Record};

use std::fmt;
use std::str::FromStr;

/// Longest tag accepted for a dataset file type.
pub const MAX_FILE_TYPE_LEN: usize = 64;

// --- Core Newtype Wrappers ---

/// Tag identifying one chunked dataset (e.g. `steady-state`, `clustering`).
///
/// The tag is embedded in artifact file names and URL paths, so it is
/// restricted to ASCII alphanumerics, `-` and `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileType(String);

impl FileType {
    /// Validate and wrap a tag.
    pub fn new(tag: impl Into<String>) -> Result<Self, DataError> {
        let tag = tag.into();
        if !Self::is_valid(&tag) {
            return Err(DataError::InvalidFileType(tag));
        }
        Ok(Self(tag))
    }

    /// Get the inner string reference
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string
    pub fn into_inner(self) -> String {
        self.0
    }

    fn is_valid(tag: &str) -> bool {
        if tag.is_empty() || tag.len() > MAX_FILE_TYPE_LEN {
            return false;
        }
        tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FileType {
    type Error = DataError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileType> for String {
    fn from(ft: FileType) -> Self {
        ft.0
    }
}

// --- Error Types ---

/// Errors raised by the shared data model.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Tag is empty, too long, or contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid file type: '{0}'")]
    InvalidFileType(String),

    /// CSV could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A manifest breaks one of its partition invariants.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for data model operations.
pub type DataResult<T> = Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_accepts_known_tags() {
        for tag in ["steady-state", "clustering", "unit_7", "A1"] {
            let ft = FileType::new(tag).unwrap();
            assert_eq!(ft.as_str(), tag);
            assert_eq!(ft.to_string(), tag);
        }
    }

    #[test]
    fn test_file_type_rejects_unsafe_tags() {
        let too_long = "x".repeat(MAX_FILE_TYPE_LEN + 1);
        for tag in ["", "../etc", "a/b", "has space", "dot.csv", too_long.as_str()] {
            assert!(
                matches!(FileType::new(tag), Err(DataError::InvalidFileType(_))),
                "{tag:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_type_serde_validates() {
        let ft: FileType = serde_json::from_str("\"clustering\"").unwrap();
        assert_eq!(ft.as_str(), "clustering");
        assert_eq!(serde_json::to_string(&ft).unwrap(), "\"clustering\"");

        assert!(serde_json::from_str::<FileType>("\"bad/tag\"").is_err());
    }
}
