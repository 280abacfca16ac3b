//! Thermal API Crate
//!
//! HTTP surface of the chunk server, built on Axum.
//!
//! # Routes
//!
//! - `GET /health`
//! - `GET /{fileType}-data-metadata` manifest of the last completed build
//! - `GET /{fileType}-data/{chunkIndex}` one chunk as a JSON array
//! - `GET /{fileType}-data` legacy whole-file export, gzip, byte ranges
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use thermal_api::{run_server_with_config, ApiConfig, AppState};
//! use thermal_chunking::ChunkStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let state = AppState::new(ChunkStore::new("public/chunks"), HashMap::new());
//!     run_server_with_config(state, ApiConfig::development()).await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod config;
mod error;
mod middleware;
#[allow(missing_docs)]
pub mod range;
#[allow(missing_docs)]
pub mod routes;
#[allow(missing_docs)]
mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ProblemDetails};
pub use state::AppState;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the router with every route and the middleware stack.
///
/// Chunk and manifest responses are compressed by `CompressionLayer` based
/// on `Accept-Encoding`. The legacy export sets its own `Content-Encoding`,
/// which the layer leaves alone.
pub fn build_router(state: AppState, config: &ApiConfig) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/{resource}", get(routes::data::resource))
        .route("/{resource}/{index}", get(routes::data::chunk))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(middleware::cors_layer(config))
}

/// Run the HTTP API server with custom configuration.
///
/// # Errors
///
/// Returns an error if the address cannot be parsed or bound, or the server
/// encounters a fatal error.
pub async fn run_server_with_config(state: AppState, config: ApiConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state, &config).await
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    config: &ApiConfig,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Chunk server listening on http://{}", addr);

    let app = build_router(state, config);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
