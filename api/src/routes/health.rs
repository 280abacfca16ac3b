//! Health check endpoint.

use axum::Json;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service name
    pub service: String,
    /// Version
    pub version: String,
}

/// `GET /health`
///
/// Used by load balancer and container probes. Takes no parameters.
pub async fn health() -> Json<HealthResponse> {
    let request_id = uuid::Uuid::new_v4();
    tracing::debug!(request_id = %request_id, "Health check request received");

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "thermal-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
