//! Platform-specific default locations.
//!
//! Server artifacts default to the working directory (`public/` next to the
//! binary), matching how the chunk server is usually deployed. The client
//! cache lives in the per-user cache directory:
//! - **Windows**: `%LOCALAPPDATA%\ThermalData\cache\`
//! - **macOS**: `~/Library/Caches/ThermalData/cache/`
//! - **Linux**: `$XDG_CACHE_HOME/ThermalData/cache/` or `~/.cache/ThermalData/cache/`

use std::path::{Path, PathBuf};

const APP_DIR: &str = "ThermalData";

/// Environment variable overriding the server data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default directory holding the source CSV files on the server.
///
/// `$DATA_DIR` when set, otherwise `./public`.
pub fn default_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("public"),
    }
}

/// Directory holding chunk artifacts for a given data directory.
pub fn chunks_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("chunks")
}

/// Default directory for the client's persistent cache.
///
/// # Examples
///
/// ```
/// use common::platform::default_cache_dir;
///
/// let dir = default_cache_dir();
/// assert!(dir.ends_with("cache"));
/// ```
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("cache")
}

/// Ensure a directory exists, creating it and its parents if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_directory(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
