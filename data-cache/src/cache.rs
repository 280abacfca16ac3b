use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::hash::content_hash;
use common::FileType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::Transactional;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default time-to-live: one hour.
pub const DEFAULT_TTL_MS: u64 = 3_600_000;

const ENTRIES_TREE: &str = "entries";
const META_TREE: &str = "meta";
const TIMESTAMP_TREE: &str = "by_timestamp";

/// Cache key holding the raw rows of one dataset, shared by every view.
pub fn raw_key(file_type: &FileType) -> String {
    format!("raw:{}", file_type)
}

/// Cache key holding the derived value of one view.
pub fn view_key(name: &str) -> String {
    format!("view:{}", name)
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// sled database directory
    pub path: PathBuf,
    pub default_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: common::platform::default_cache_dir(),
            default_ttl_ms: DEFAULT_TTL_MS,
        }
    }
}

impl CacheConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Everything about an entry except its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Lowercase hex SHA-256 of the stored value
    pub hash: String,
    /// Write time, ms since epoch
    pub timestamp: u64,
    /// TTL in ms
    pub expire_time: u64,
}

impl EntryMetadata {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.expire_time
    }
}

/// A stored value with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    pub timestamp: u64,
    pub expire_time: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub size_on_disk: u64,
}

struct Store {
    db: sled::Db,
    entries: sled::Tree,
    meta: sled::Tree,
    by_timestamp: sled::Tree,
}

/// Persistent key/value cache with content hashes and per-entry TTL.
///
/// Three sled trees back it: `entries` (JSON payloads), `meta` (hash,
/// timestamp, TTL) and `by_timestamp` (write-time index used by sweeps).
/// Writes touch all three in one transaction.
///
/// The store is opened lazily on first use; [`ContentCache::initialize`]
/// may be called up front to surface open errors early.
pub struct ContentCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    store: OnceCell<Store>,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Open or create the database. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.store().await.map(|_| ())
    }

    async fn store(&self) -> Result<&Store> {
        self.store
            .get_or_try_init(|| async {
                common::platform::ensure_directory(&self.config.path)?;
                let db = sled::open(&self.config.path)?;
                let store = Store {
                    entries: db.open_tree(ENTRIES_TREE)?,
                    meta: db.open_tree(META_TREE)?,
                    by_timestamp: db.open_tree(TIMESTAMP_TREE)?,
                    db,
                };
                log::info!(
                    "[ContentCache] Opened {} ({} entries)",
                    self.config.path.display(),
                    store.entries.len()
                );
                Ok(store)
            })
            .await
    }

    /// Store `data` under `key` with the default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<()> {
        self.set_with_ttl(key, data, self.config.default_ttl_ms).await
    }

    /// Store `data` under `key`, replacing any previous entry.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl_ms: u64) -> Result<()> {
        let store = self.store().await?;
        let payload = serde_json::to_vec(data)?;
        let meta = EntryMetadata {
            hash: content_hash(data)?,
            timestamp: self.clock.now_ms(),
            expire_time: ttl_ms,
        };
        let meta_bytes = encode_meta(&meta)?;
        let index_row = index_key(meta.timestamp, key);

        let result: TransactionResult<(), CacheError> = (&store.entries, &store.meta, &store.by_timestamp).transaction(
            |(entries, metas, index)| {
                if let Some(old) = metas.get(key)? {
                    if let Ok(old) = bincode::deserialize::<EntryMetadata>(&old) {
                        index.remove(index_key(old.timestamp, key))?;
                    }
                }
                entries.insert(key, payload.as_slice())?;
                metas.insert(key, meta_bytes.as_slice())?;
                index.insert(index_row.as_slice(), Vec::<u8>::new())?;
                Ok(())
            },
        );
        result.map_err(storage_error)?;

        log::debug!("[ContentCache] Set '{}' ({} bytes, ttl {}ms)", key, payload.len(), ttl_ms);
        Ok(())
    }

    /// Value under `key`, or `None` when absent or expired.
    ///
    /// An expired entry is deleted as a side effect.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.data))
    }

    /// Like [`get`](Self::get) but returns the metadata alongside the value.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let store = self.store().await?;
        let Some(meta) = read_meta(store, key)? else {
            return Ok(None);
        };
        if meta.is_expired(self.clock.now_ms()) {
            log::debug!("[ContentCache] '{}' expired, evicting", key);
            remove_entry(store, key)?;
            return Ok(None);
        }
        let Some(bytes) = store.entries.get(key)? else {
            return Ok(None);
        };
        Ok(Some(CacheEntry {
            key: key.to_string(),
            data: serde_json::from_slice(&bytes)?,
            timestamp: meta.timestamp,
            expire_time: meta.expire_time,
            hash: meta.hash,
        }))
    }

    /// Hash and timestamps of a live entry. Reads the metadata tree only.
    pub async fn get_metadata(&self, key: &str) -> Result<Option<EntryMetadata>> {
        let store = self.store().await?;
        let now = self.clock.now_ms();
        Ok(read_meta(store, key)?.filter(|meta| !meta.is_expired(now)))
    }

    /// True iff a live entry exists under `key` and its hash equals the
    /// digest of `candidate`.
    pub async fn compare_hash<T: Serialize + ?Sized>(&self, key: &str, candidate: &T) -> Result<bool> {
        let Some(meta) = self.get_metadata(key).await? else {
            return Ok(false);
        };
        Ok(meta.hash == content_hash(candidate)?)
    }

    pub async fn clear(&self, key: &str) -> Result<()> {
        let store = self.store().await?;
        if remove_entry(store, key)? {
            log::debug!("[ContentCache] Cleared '{}'", key);
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        let store = self.store().await?;
        store.entries.clear()?;
        store.meta.clear()?;
        store.by_timestamp.clear()?;
        store.db.flush_async().await?;
        log::info!("[ContentCache] Cleared all entries");
        Ok(())
    }

    /// Delete every entry past its TTL, walking the timestamp index oldest
    /// first. Returns how many entries were removed.
    pub async fn clear_expired(&self) -> Result<usize> {
        let store = self.store().await?;
        let now = self.clock.now_ms();

        let rows: Vec<sled::IVec> = store
            .by_timestamp
            .iter()
            .keys()
            .collect::<std::result::Result<_, _>>()?;

        let mut removed = 0;
        for row in rows {
            let Some((timestamp, key)) = split_index_key(&row) else {
                store.by_timestamp.remove(&row)?;
                continue;
            };
            match read_meta(store, &key) {
                Ok(Some(meta)) if meta.timestamp == timestamp => {
                    if meta.is_expired(now) && remove_entry(store, &key)? {
                        removed += 1;
                    }
                }
                Ok(_) => {
                    // Left behind by an overwrite or an earlier delete.
                    store.by_timestamp.remove(&row)?;
                }
                Err(e) => {
                    log::warn!("[ContentCache] Dropping unreadable entry '{}': {}", key, e);
                    if remove_entry(store, &key)? {
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            store.db.flush_async().await?;
        }
        log::info!("[ContentCache] Swept {} expired entries", removed);
        Ok(removed)
    }

    /// Keys of every stored entry, live or not.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let store = self.store().await?;
        store
            .meta
            .iter()
            .keys()
            .map(|k| Ok(String::from_utf8_lossy(&k?).into_owned()))
            .collect()
    }

    // --- Raw dataset helpers ---

    /// Store the canonical CSV text of a fully fetched dataset.
    pub async fn save_raw(&self, file_type: &FileType, csv: &str) -> Result<()> {
        self.set(&raw_key(file_type), csv).await?;
        self.flush().await
    }

    pub async fn get_raw(&self, file_type: &FileType) -> Result<Option<String>> {
        self.get(&raw_key(file_type)).await
    }

    pub async fn has_raw(&self, file_type: &FileType) -> Result<bool> {
        Ok(self.get_metadata(&raw_key(file_type)).await?.is_some())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let store = self.store().await?;
        Ok(CacheStats {
            entries: store.entries.len(),
            size_on_disk: store.db.size_on_disk()?,
        })
    }

    /// Persist buffered writes.
    pub async fn flush(&self) -> Result<()> {
        let store = self.store().await?;
        store.db.flush_async().await?;
        Ok(())
    }
}

impl Drop for ContentCache {
    fn drop(&mut self) {
        // Best-effort sync flush (can't do async in Drop)
        if let Some(store) = self.store.get() {
            if let Err(e) = store.db.flush() {
                log::warn!("[ContentCache] Failed to flush on drop: {}", e);
            }
        }
    }
}

fn index_key(timestamp: u64, key: &str) -> Vec<u8> {
    let mut row = Vec::with_capacity(8 + key.len());
    row.extend_from_slice(&timestamp.to_be_bytes());
    row.extend_from_slice(key.as_bytes());
    row
}

fn split_index_key(row: &[u8]) -> Option<(u64, String)> {
    if row.len() < 8 {
        return None;
    }
    let (ts, key) = row.split_at(8);
    let ts = u64::from_be_bytes(ts.try_into().ok()?);
    Some((ts, String::from_utf8(key.to_vec()).ok()?))
}

fn encode_meta(meta: &EntryMetadata) -> Result<Vec<u8>> {
    bincode::serialize(meta).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn read_meta(store: &Store, key: &str) -> Result<Option<EntryMetadata>> {
    match store.meta.get(key)? {
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| CacheError::CorruptMetadata {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Delete an entry from all three trees. Returns whether anything existed.
fn remove_entry(store: &Store, key: &str) -> Result<bool> {
    let result: TransactionResult<bool, CacheError> = (&store.entries, &store.meta, &store.by_timestamp).transaction(
        |(entries, metas, index)| {
            let old_meta = metas.remove(key)?;
            if let Some(old) = &old_meta {
                if let Ok(old) = bincode::deserialize::<EntryMetadata>(old) {
                    index.remove(index_key(old.timestamp, key))?;
                }
            }
            let old_entry = entries.remove(key)?;
            Ok::<_, ConflictableTransactionError<CacheError>>(old_meta.is_some() || old_entry.is_some())
        },
    );
    result.map_err(storage_error)
}

fn storage_error(err: TransactionError<CacheError>) -> CacheError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => CacheError::Storage(e),
    }
}
