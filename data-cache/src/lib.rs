//! Client-side persistent cache.
//!
//! Entries are JSON values stored in sled with a SHA-256 content hash and a
//! TTL. Raw dataset rows live under `raw:{fileType}` and derived view values
//! under `view:{name}`.

pub mod cache;
pub mod clock;
pub mod error;
pub mod hash;

pub use cache::{
    raw_key, view_key, CacheConfig, CacheEntry, CacheStats, ContentCache, EntryMetadata, DEFAULT_TTL_MS,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CacheError, Result};
pub use hash::content_hash;
