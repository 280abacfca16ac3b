//! Cache-first loading of derived views.
//!
//! A view is a value computed from one or more raw datasets. Loading one
//! tries, in order: the cached view, the cached raw rows, and finally the
//! progressive fetcher. Concurrent loads of the same raw dataset or the same
//! view share a single run through [`SingleFlight`].

use crate::config::FetcherConfig;
use crate::error::{CoordinatorError, CoordinatorResult, FetchResult};
use crate::fetcher::ProgressiveFetcher;
use crate::single_flight::SingleFlight;
use common::rows::parse_csv;
use common::{FileType, Record};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thermal_data_cache::{content_hash, raw_key, ContentCache};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Caller-supplied computation of a view from raw rows.
pub trait Derivation: Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Cache key of the view, usually built with
    /// [`thermal_data_cache::view_key`].
    fn view_key(&self) -> String;

    /// Raw datasets the view is computed from.
    fn file_types(&self) -> Vec<FileType>;

    fn derive(&self, raw: &RawTables) -> Self::Output;
}

/// Raw rows handed to [`Derivation::derive`], keyed by dataset.
#[derive(Debug, Default, Clone)]
pub struct RawTables {
    tables: HashMap<FileType, Arc<Vec<Record>>>,
}

impl RawTables {
    pub fn insert(&mut self, file_type: FileType, rows: Arc<Vec<Record>>) {
        self.tables.insert(file_type, rows);
    }

    pub fn get(&self, file_type: &FileType) -> Option<&[Record]> {
        self.tables.get(file_type).map(|rows| rows.as_slice())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Where a loaded view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served straight from the view cache
    DerivedCache,
    /// Recomputed and written to the view cache
    Computed,
    /// Recomputed, but identical to the cached value, which is kept
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: Arc<T>,
    pub source: Source,
}

#[derive(Clone)]
struct SharedView {
    value: Arc<Value>,
    source: Source,
}

/// State shared by every coordinator in a process.
pub struct LoadContext {
    cache: Arc<ContentCache>,
    fetcher: ProgressiveFetcher,
    raw_flights: SingleFlight<Arc<Vec<Record>>>,
    view_flights: SingleFlight<SharedView>,
}

impl LoadContext {
    /// The fetcher writes completed datasets into `cache`.
    pub fn new(cache: Arc<ContentCache>, config: FetcherConfig) -> FetchResult<Self> {
        let fetcher = ProgressiveFetcher::new(config, Some(cache.clone()))?;
        Ok(Self {
            cache,
            fetcher,
            raw_flights: SingleFlight::new(),
            view_flights: SingleFlight::new(),
        })
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn fetcher(&self) -> &ProgressiveFetcher {
        &self.fetcher
    }

    /// Rows of `file_type` from the raw cache, fetching them on a miss.
    pub async fn raw_rows(
        &self,
        file_type: &FileType,
        cancel: &CancellationToken,
    ) -> CoordinatorResult<Arc<Vec<Record>>> {
        let key = raw_key(file_type);
        shared_run(&self.raw_flights, &key, cancel, move || async move {
            if let Some(rows) = self.cached_raw(file_type).await {
                return Ok(Arc::new(rows));
            }
            let rows = self.fetcher.fetch(file_type.clone(), cancel.clone()).await?;
            Ok(Arc::new(rows))
        })
        .await
    }

    async fn cached_raw(&self, file_type: &FileType) -> Option<Vec<Record>> {
        let csv = match self.cache.get_raw(file_type).await {
            Ok(Some(csv)) => csv,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(%file_type, error = %e, "Raw cache read failed, refetching");
                return None;
            }
        };
        match parse_csv(&csv) {
            Ok(rows) => {
                tracing::debug!(%file_type, records = rows.len(), "Raw cache hit");
                Some(rows)
            }
            Err(e) => {
                tracing::warn!(%file_type, error = %e, "Cached raw rows unreadable, refetching");
                None
            }
        }
    }
}

/// Run `work` through `flights`, retrying when the run being waited on is
/// abandoned. Cancelling `cancel` drops this caller's part in the run.
async fn shared_run<V, F, Fut>(
    flights: &SingleFlight<V>,
    key: &str,
    cancel: &CancellationToken,
    work: F,
) -> CoordinatorResult<V>
where
    V: Clone + Send + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = CoordinatorResult<V>>,
{
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
            result = flights.run(key, &work) => result,
        };
        match attempt {
            Err(CoordinatorError::Abandoned) => {
                tracing::debug!(key, "Shared load abandoned, retrying");
            }
            other => return other,
        }
    }
}

/// Loads one view and publishes it to subscribers.
///
/// Subscribers are only notified when the loaded content differs from what
/// was last published; an identical reload hands back the published `Arc`.
pub struct ViewCoordinator<D: Derivation> {
    context: Arc<LoadContext>,
    derivation: D,
    published: watch::Sender<Option<Arc<D::Output>>>,
    /// Content hash of the published value
    published_hash: Mutex<Option<String>>,
}

impl<D: Derivation> ViewCoordinator<D> {
    pub fn new(context: Arc<LoadContext>, derivation: D) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            context,
            derivation,
            published,
            published_hash: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<D::Output>>> {
        self.published.subscribe()
    }

    /// Most recently published value.
    pub fn current(&self) -> Option<Arc<D::Output>> {
        self.published.borrow().clone()
    }

    pub async fn load(&self, cancel: CancellationToken) -> CoordinatorResult<Loaded<D::Output>> {
        let key = self.derivation.view_key();
        let (key_ref, cancel_ref) = (key.as_str(), &cancel);
        let shared = shared_run(&self.context.view_flights, key_ref, cancel_ref, move || {
            self.compute(key_ref, cancel_ref)
        })
        .await?;

        let decoded: D::Output = serde_json::from_value((*shared.value).clone())?;
        let hash = match content_hash(&*shared.value) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(view = %key, error = %e, "Could not hash loaded view");
                None
            }
        };
        let value = self.publish(decoded, hash);
        tracing::info!(view = %key, source = ?shared.source, "View loaded");
        Ok(Loaded {
            value,
            source: shared.source,
        })
    }

    /// Publish `decoded` unless the current value has the same hash, in
    /// which case the current `Arc` is returned and nobody is notified.
    fn publish(&self, decoded: D::Output, hash: Option<String>) -> Arc<D::Output> {
        let mut last = self.published_hash.lock().unwrap_or_else(PoisonError::into_inner);
        let mut value = Arc::new(decoded);
        self.published.send_if_modified(|current| match current {
            Some(existing) if hash.is_some() && *last == hash => {
                value = existing.clone();
                false
            }
            _ => {
                *current = Some(value.clone());
                *last = hash;
                true
            }
        });
        value
    }

    async fn compute(&self, key: &str, cancel: &CancellationToken) -> CoordinatorResult<SharedView> {
        let cache = &self.context.cache;

        match cache.get::<Value>(key).await {
            Ok(Some(cached)) => match serde_json::from_value::<D::Output>(cached.clone()) {
                Ok(_) => {
                    return Ok(SharedView {
                        value: Arc::new(cached),
                        source: Source::DerivedCache,
                    })
                }
                Err(e) => tracing::warn!(view = key, error = %e, "Cached view has an unexpected shape"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(view = key, error = %e, "View cache read failed"),
        }

        let mut tables = RawTables::default();
        for file_type in self.derivation.file_types() {
            let rows = self.context.raw_rows(&file_type, cancel).await?;
            tables.insert(file_type, rows);
        }

        let output = self.derivation.derive(&tables);
        let value = serde_json::to_value(&output)?;

        let unchanged = match cache.compare_hash(key, &value).await {
            Ok(same) => same,
            Err(e) => {
                tracing::warn!(view = key, error = %e, "View hash comparison failed");
                false
            }
        };
        if unchanged {
            if let Ok(Some(existing)) = cache.get::<Value>(key).await {
                return Ok(SharedView {
                    value: Arc::new(existing),
                    source: Source::Unchanged,
                });
            }
        }

        if let Err(e) = cache.set(key, &value).await {
            tracing::warn!(view = key, error = %e, "Failed to store view");
        }
        Ok(SharedView {
            value: Arc::new(value),
            source: Source::Computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Arc<Vec<Record>> {
        Arc::new(
            (0..n)
                .map(|i| {
                    let mut r = Record::new();
                    r.insert("i".into(), json!(i.to_string()));
                    r
                })
                .collect(),
        )
    }

    #[test]
    fn test_raw_tables_lookup() {
        let ft = FileType::new("clustering").unwrap();
        let other = FileType::new("steady-state").unwrap();
        let mut tables = RawTables::default();
        assert!(tables.is_empty());

        tables.insert(ft.clone(), rows(3));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables.get(&ft).map(|r| r.len()), Some(3));
        assert!(tables.get(&other).is_none());
    }
}
