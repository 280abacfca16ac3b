//! ViewCoordinator: cache-first loading and single-flight coalescing.

mod support;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use support::ft;
use thermal_client::{
    CoordinatorError, Derivation, FetchError, FetcherConfig, LoadContext, RawTables, Source, ViewCoordinator,
};
use thermal_data_cache::{view_key, CacheConfig, ContentCache, ManualClock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Summary {
    records: usize,
    max_temperature: u32,
}

struct SummaryView {
    file_type: &'static str,
}

impl Derivation for SummaryView {
    type Output = Summary;

    fn view_key(&self) -> String {
        view_key(&format!("summary-{}", self.file_type))
    }

    fn file_types(&self) -> Vec<common::FileType> {
        vec![ft(self.file_type)]
    }

    fn derive(&self, raw: &RawTables) -> Summary {
        let rows = raw.get(&ft(self.file_type)).unwrap_or_default();
        let max_temperature = rows
            .iter()
            .filter_map(|r| r.get("temperature")?.as_str()?.parse().ok())
            .max()
            .unwrap_or(0);
        Summary {
            records: rows.len(),
            max_temperature,
        }
    }
}

fn steady_view() -> SummaryView {
    SummaryView {
        file_type: "steady-state",
    }
}

fn context(server: &support::TestServer) -> Arc<LoadContext> {
    let cache = Arc::new(ContentCache::new(CacheConfig::at(&server.cache_dir)));
    Arc::new(LoadContext::new(cache, FetcherConfig::with_base_url(&server.base_url)).unwrap())
}

const EXPECTED: Summary = Summary {
    records: 12,
    max_temperature: 24,
};

#[tokio::test]
async fn test_first_load_computes_then_serves_from_cache() {
    let server = support::start(Duration::ZERO).await;
    let ctx = context(&server);
    let coordinator = ViewCoordinator::new(ctx.clone(), steady_view());

    let first = coordinator.load(CancellationToken::new()).await.unwrap();
    assert_eq!(*first.value, EXPECTED);
    assert_eq!(first.source, Source::Computed);
    assert!(ctx.cache().has_raw(&ft("steady-state")).await.unwrap());

    let second = coordinator.load(CancellationToken::new()).await.unwrap();
    assert_eq!(*second.value, EXPECTED);
    assert_eq!(second.source, Source::DerivedCache);
    assert_eq!(server.traffic.metadata(), 1);
}

#[tokio::test]
async fn test_concurrent_loads_share_one_fetch() {
    let server = support::start(Duration::from_millis(200)).await;
    let ctx = context(&server);
    let a = ViewCoordinator::new(ctx.clone(), steady_view());
    let b = ViewCoordinator::new(ctx.clone(), steady_view());

    let (ra, rb) = tokio::join!(a.load(CancellationToken::new()), b.load(CancellationToken::new()));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(*ra.value, EXPECTED);
    assert_eq!(*rb.value, EXPECTED);
    assert_eq!(ra.source, rb.source);
    assert_eq!(server.traffic.metadata(), 1);
    assert_eq!(server.traffic.chunks(), 3);
}

#[tokio::test]
async fn test_raw_cache_hit_skips_network() {
    let server = support::start(Duration::ZERO).await;
    let ctx = context(&server);
    ctx.cache()
        .save_raw(&ft("steady-state"), "time,temperature\n0,31\n1,30\n")
        .await
        .unwrap();

    let coordinator = ViewCoordinator::new(ctx, steady_view());
    let loaded = coordinator.load(CancellationToken::new()).await.unwrap();

    assert_eq!(
        *loaded.value,
        Summary {
            records: 2,
            max_temperature: 31
        }
    );
    assert_eq!(loaded.source, Source::Computed);
    assert_eq!(server.traffic.metadata(), 0);
}

#[tokio::test]
async fn test_unreadable_raw_cache_falls_back_to_fetch() {
    let server = support::start(Duration::ZERO).await;
    let ctx = context(&server);
    ctx.cache()
        .save_raw(&ft("steady-state"), "time,temperature\n0,31,extra\n")
        .await
        .unwrap();

    let coordinator = ViewCoordinator::new(ctx, steady_view());
    let loaded = coordinator.load(CancellationToken::new()).await.unwrap();

    assert_eq!(*loaded.value, EXPECTED);
    assert_eq!(server.traffic.metadata(), 1);
}

#[tokio::test]
async fn test_fetch_failure_propagates() {
    let server = support::start(Duration::ZERO).await;
    let ctx = context(&server);
    let coordinator = ViewCoordinator::new(
        ctx.clone(),
        SummaryView {
            file_type: "clustering",
        },
    );

    let err = coordinator.load(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Fetch(FetchError::MetadataUnavailable(_))
    ));
    assert!(coordinator.current().is_none());
    assert!(ctx.cache().get_metadata(&view_key("summary-clustering")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_identical_reload_keeps_published_value() {
    let server = support::start(Duration::ZERO).await;
    let coordinator = ViewCoordinator::new(context(&server), steady_view());
    let mut rx = coordinator.subscribe();

    let first = coordinator.load(CancellationToken::new()).await.unwrap();
    assert_eq!(first.source, Source::Computed);
    assert_eq!(rx.borrow_and_update().as_deref(), Some(&EXPECTED));

    let second = coordinator.load(CancellationToken::new()).await.unwrap();
    assert_eq!(second.source, Source::DerivedCache);
    assert!(Arc::ptr_eq(&first.value, &second.value));
    assert!(!rx.has_changed().unwrap());
    assert!(Arc::ptr_eq(&coordinator.current().unwrap(), &first.value));
}

#[tokio::test]
async fn test_identical_recompute_is_unchanged_and_keeps_timestamp() {
    let server = support::start(Duration::from_millis(300)).await;
    let clock = Arc::new(ManualClock::new(1_000_000));
    let cache = Arc::new(ContentCache::with_clock(CacheConfig::at(&server.cache_dir), clock.clone()));
    // Separate contexts so the two loads do not coalesce
    let first_ctx = Arc::new(LoadContext::new(cache.clone(), FetcherConfig::with_base_url(&server.base_url)).unwrap());
    let second_ctx = Arc::new(LoadContext::new(cache.clone(), FetcherConfig::with_base_url(&server.base_url)).unwrap());
    let first = Arc::new(ViewCoordinator::new(first_ctx, steady_view()));
    let second = Arc::new(ViewCoordinator::new(second_ctx, steady_view()));

    let first_task = {
        let first = first.clone();
        tokio::spawn(async move { first.load(CancellationToken::new()).await })
    };
    // Both loads miss the view cache before either one finishes
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second_task = {
        let second = second.clone();
        tokio::spawn(async move { second.load(CancellationToken::new()).await })
    };

    let computed = first_task.await.unwrap().unwrap();
    assert_eq!(computed.source, Source::Computed);
    let key = view_key("summary-steady-state");
    let written = cache.get_metadata(&key).await.unwrap().unwrap();
    assert_eq!(written.timestamp, 1_000_000);
    clock.advance(10);

    let unchanged = second_task.await.unwrap().unwrap();
    assert_eq!(unchanged.source, Source::Unchanged);
    assert_eq!(*unchanged.value, EXPECTED);
    let after = cache.get_metadata(&key).await.unwrap().unwrap();
    assert_eq!(after, written);
    assert_eq!(server.traffic.metadata(), 2);
}

#[tokio::test]
async fn test_subscribers_see_published_value() {
    let server = support::start(Duration::ZERO).await;
    let coordinator = ViewCoordinator::new(context(&server), steady_view());
    let mut rx = coordinator.subscribe();
    assert!(rx.borrow().is_none());

    coordinator.load(CancellationToken::new()).await.unwrap();

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_deref(), Some(&EXPECTED));
    assert_eq!(coordinator.current().as_deref(), Some(&EXPECTED));
}

#[tokio::test]
async fn test_cancelled_load_returns_cancelled() {
    let server = support::start(Duration::ZERO).await;
    let ctx = context(&server);
    let coordinator = ViewCoordinator::new(ctx.clone(), steady_view());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = coordinator.load(cancel).await.unwrap_err();

    assert!(matches!(err, CoordinatorError::Cancelled));
    assert!(!ctx.cache().has_raw(&ft("steady-state")).await.unwrap());
}

#[tokio::test]
async fn test_waiter_retries_after_leader_is_cancelled() {
    let server = support::start(Duration::from_millis(300)).await;
    let ctx = context(&server);
    let leader = Arc::new(ViewCoordinator::new(ctx.clone(), steady_view()));
    let follower = Arc::new(ViewCoordinator::new(ctx.clone(), steady_view()));

    let leader_cancel = CancellationToken::new();
    let leader_task = {
        let leader = leader.clone();
        let cancel = leader_cancel.clone();
        tokio::spawn(async move { leader.load(cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let follower_task = {
        let follower = follower.clone();
        tokio::spawn(async move { follower.load(CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader_cancel.cancel();

    assert!(matches!(leader_task.await.unwrap(), Err(CoordinatorError::Cancelled)));
    let loaded = follower_task.await.unwrap().unwrap();
    assert_eq!(*loaded.value, EXPECTED);
    // The abandoned attempt and the retry each asked for the manifest
    assert_eq!(server.traffic.metadata(), 2);
}
