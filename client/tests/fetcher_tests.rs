//! ProgressiveFetcher against a live chunk server.

mod support;

use common::rows::parse_csv;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::ft;
use thermal_client::{FetchError, FetchEvent, FetchState, FetcherConfig, ProgressiveFetcher};
use thermal_data_cache::{CacheConfig, ContentCache};
use tokio_util::sync::CancellationToken;

fn cache_at(server: &support::TestServer) -> Arc<ContentCache> {
    Arc::new(ContentCache::new(CacheConfig::at(&server.cache_dir)))
}

async fn collect(
    fetcher: &ProgressiveFetcher,
    tag: &str,
    cancel: CancellationToken,
) -> (Vec<FetchEvent>, Result<Vec<common::Record>, FetchError>) {
    let mut handle = fetcher.spawn(ft(tag), cancel);
    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    (events, handle.join.await.unwrap())
}

fn progress(events: &[FetchEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            FetchEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

fn states(events: &[FetchEvent]) -> Vec<FetchState> {
    events
        .iter()
        .filter_map(|e| match e {
            FetchEvent::State(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_progress_and_states_for_three_chunks() {
    let server = support::start(Duration::ZERO).await;
    let fetcher = ProgressiveFetcher::new(FetcherConfig::with_base_url(&server.base_url), None).unwrap();

    let (events, result) = collect(&fetcher, "steady-state", CancellationToken::new()).await;
    let rows = result.unwrap();

    assert_eq!(rows.len(), 12);
    assert_eq!(progress(&events), vec![10, 37, 63, 90, 100]);
    assert_eq!(
        states(&events),
        vec![
            FetchState::Idle,
            FetchState::FetchingMetadata,
            FetchState::FetchingChunks,
            FetchState::Assembling,
            FetchState::Done,
        ]
    );
    assert_eq!(server.traffic.metadata(), 1);
    assert_eq!(server.traffic.chunks(), 3);
}

#[tokio::test]
async fn test_rows_arrive_in_source_order() {
    let server = support::start(Duration::ZERO).await;
    let fetcher = ProgressiveFetcher::new(FetcherConfig::with_base_url(&server.base_url), None).unwrap();

    let (events, result) = collect(&fetcher, "steady-state", CancellationToken::new()).await;
    let rows = result.unwrap();

    let times: Vec<_> = rows.iter().map(|r| r["time"].clone()).collect();
    let expected: Vec<_> = (0..12).map(|i| json!(i.to_string())).collect();
    assert_eq!(times, expected);

    // First chunk goes out on its own; the rest is below the interim
    // threshold and is flushed as one tail batch.
    let batches: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            FetchEvent::Rows { first_index, rows } => Some((*first_index, rows.len())),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![(0, 5), (5, 7)]);
}

#[tokio::test]
async fn test_interim_batches_follow_threshold() {
    let server = support::start(Duration::ZERO).await;
    let config = FetcherConfig {
        interim_min_records: 1,
        ..FetcherConfig::with_base_url(&server.base_url)
    };
    let fetcher = ProgressiveFetcher::new(config, None).unwrap();

    let (events, result) = collect(&fetcher, "steady-state", CancellationToken::new()).await;
    result.unwrap();

    let batches: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            FetchEvent::Rows { first_index, rows } => Some((*first_index, rows.len())),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![(0, 5), (5, 5), (10, 2)]);
}

#[tokio::test]
async fn test_completed_fetch_populates_raw_cache() {
    let server = support::start(Duration::ZERO).await;
    let cache = cache_at(&server);
    let fetcher =
        ProgressiveFetcher::new(FetcherConfig::with_base_url(&server.base_url), Some(cache.clone())).unwrap();

    let rows = fetcher
        .fetch(ft("steady-state"), CancellationToken::new())
        .await
        .unwrap();

    let csv = cache.get_raw(&ft("steady-state")).await.unwrap().unwrap();
    assert!(csv.starts_with("time,temperature\n"));
    assert_eq!(parse_csv(&csv).unwrap(), rows);
}

#[tokio::test]
async fn test_cancelled_before_start_persists_nothing() {
    let server = support::start(Duration::ZERO).await;
    let cache = cache_at(&server);
    let fetcher =
        ProgressiveFetcher::new(FetcherConfig::with_base_url(&server.base_url), Some(cache.clone())).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (events, result) = collect(&fetcher, "steady-state", cancel).await;

    assert!(matches!(result, Err(FetchError::Cancelled)));
    assert_eq!(states(&events), vec![FetchState::Idle, FetchState::Cancelled]);
    assert!(!cache.has_raw(&ft("steady-state")).await.unwrap());
    assert_eq!(server.traffic.metadata(), 0);
}

#[tokio::test]
async fn test_cancelled_mid_fetch_persists_nothing() {
    let server = support::start(Duration::ZERO).await;
    let cache = cache_at(&server);
    let config = FetcherConfig {
        event_buffer: 1,
        ..FetcherConfig::with_base_url(&server.base_url)
    };
    let fetcher = ProgressiveFetcher::new(config, Some(cache.clone())).unwrap();

    let cancel = CancellationToken::new();
    let mut handle = fetcher.spawn(ft("steady-state"), cancel.clone());
    let mut saw_cancelled = false;
    while let Some(event) = handle.events.recv().await {
        match event {
            FetchEvent::Rows { first_index: 0, .. } => cancel.cancel(),
            FetchEvent::State(FetchState::Cancelled) => saw_cancelled = true,
            FetchEvent::State(FetchState::Done) => panic!("fetch completed after cancellation"),
            _ => {}
        }
    }

    assert!(matches!(handle.join.await.unwrap(), Err(FetchError::Cancelled)));
    assert!(saw_cancelled);
    assert!(!cache.has_raw(&ft("steady-state")).await.unwrap());
}

#[tokio::test]
async fn test_missing_manifest_ends_in_error_state() {
    let server = support::start(Duration::ZERO).await;
    let cache = cache_at(&server);
    let fetcher =
        ProgressiveFetcher::new(FetcherConfig::with_base_url(&server.base_url), Some(cache.clone())).unwrap();

    let (events, result) = collect(&fetcher, "clustering", CancellationToken::new()).await;

    assert!(matches!(result, Err(FetchError::MetadataUnavailable(_))));
    let last = states(&events).pop().unwrap();
    match last {
        FetchState::Error(message) => assert!(message.starts_with("metadata unavailable")),
        other => panic!("unexpected final state {other:?}"),
    }
    assert_eq!(server.traffic.chunks(), 0);
    assert!(!cache.has_raw(&ft("clustering")).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_server_is_metadata_error() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let fetcher = ProgressiveFetcher::new(FetcherConfig::with_base_url(format!("http://{addr}")), None).unwrap();
    let err = fetcher
        .fetch(ft("steady-state"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::MetadataUnavailable(_)));
}
