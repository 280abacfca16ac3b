//! CORS middleware configuration.

use crate::config::ApiConfig;
use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create CORS layer from configuration.
///
/// Dataset endpoints are read-only, so only `GET` and `HEAD` are allowed.
/// `Content-Range` is exposed so browser clients can read partial responses.
pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if !config.enable_cors {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_RANGE, header::ACCEPT_RANGES]);

    if config.cors_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
