//! Shared fixture: a real chunk server on an ephemeral port.

#![allow(dead_code)]

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use common::FileType;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thermal_api::{build_router, ApiConfig, AppState};
use thermal_chunking::{ChunkBuilder, ChunkStore};

pub fn ft(tag: &str) -> FileType {
    FileType::new(tag).unwrap()
}

/// Request counters and an artificial delay on manifest requests.
#[derive(Default)]
pub struct Traffic {
    pub metadata_requests: AtomicUsize,
    pub chunk_requests: AtomicUsize,
    pub metadata_delay: Duration,
}

impl Traffic {
    pub fn metadata(&self) -> usize {
        self.metadata_requests.load(Ordering::SeqCst)
    }

    pub fn chunks(&self) -> usize {
        self.chunk_requests.load(Ordering::SeqCst)
    }
}

async fn observe(State(traffic): State<Arc<Traffic>>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path.ends_with("-data-metadata") {
        traffic.metadata_requests.fetch_add(1, Ordering::SeqCst);
        if !traffic.metadata_delay.is_zero() {
            tokio::time::sleep(traffic.metadata_delay).await;
        }
    } else if path.contains("-data/") {
        traffic.chunk_requests.fetch_add(1, Ordering::SeqCst);
    }
    next.run(req).await
}

pub struct TestServer {
    _temp: TempDir,
    pub base_url: String,
    pub traffic: Arc<Traffic>,
    /// Scratch directory for client caches
    pub cache_dir: std::path::PathBuf,
}

fn write_csv(path: &Path, rows: usize) {
    let mut text = String::from("time,temperature\n");
    for i in 0..rows {
        writeln!(text, "{},{}", i, 20 + i % 5).unwrap();
    }
    std::fs::write(path, text).unwrap();
}

/// Serves `steady-state` as 12 rows in chunks of 5 (3 chunks). Nothing else
/// is chunked.
pub async fn start(metadata_delay: Duration) -> TestServer {
    let temp = TempDir::new().unwrap();
    let chunks_dir = temp.path().join("chunks");

    let steady = temp.path().join("steady_state_data.csv");
    write_csv(&steady, 12);
    ChunkBuilder::new(&chunks_dir, 5)
        .unwrap()
        .build(&steady, &ft("steady-state"))
        .unwrap();

    let state = AppState::new(
        ChunkStore::new(&chunks_dir),
        HashMap::from([(ft("steady-state"), steady)]),
    );
    let traffic = Arc::new(Traffic {
        metadata_delay,
        ..Traffic::default()
    });
    let app = build_router(state, &ApiConfig::development())
        .layer(middleware::from_fn_with_state(traffic.clone(), observe));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let cache_dir = temp.path().join("client-cache");
    TestServer {
        _temp: temp,
        base_url: format!("http://{addr}"),
        traffic,
        cache_dir,
    }
}
