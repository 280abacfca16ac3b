//! Platform path tests for the common crate

use common::platform::{chunks_dir, default_cache_dir, ensure_directory};
use std::path::Path;

#[test]
fn test_default_cache_dir_is_namespaced() {
    let path = default_cache_dir();
    let text = path.to_string_lossy();
    assert!(text.contains("ThermalData"));
    assert!(path.ends_with("cache"));
}

#[test]
fn test_chunks_dir_is_under_data_dir() {
    assert_eq!(chunks_dir(Path::new("/srv/data")), Path::new("/srv/data/chunks"));
}

#[test]
fn test_ensure_directory_creates_nested() {
    let temp = tempfile::TempDir::new().unwrap();
    let nested = temp.path().join("a").join("b").join("c");

    ensure_directory(&nested).unwrap();
    assert!(nested.is_dir());

    // Second call is a no-op
    ensure_directory(&nested).unwrap();
}
