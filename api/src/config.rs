//! API configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP API server.
///
/// # Example
///
/// ```rust
/// use thermal_api::ApiConfig;
///
/// let config = ApiConfig {
///     host: "127.0.0.1".to_string(),
///     port: 5001,
///     enable_cors: true,
///     cors_origins: vec!["*".to_string()],
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to.
    ///
    /// Default: `0.0.0.0`
    pub host: String,

    /// Port to bind the HTTP server to.
    ///
    /// Default: 5001
    pub port: u16,

    /// Enable Cross-Origin Resource Sharing (CORS).
    ///
    /// Default: true
    pub enable_cors: bool,

    /// Allowed origins for CORS requests.
    ///
    /// Use `["*"]` to allow all origins (development only).
    ///
    /// Default: `["*"]`
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ApiConfig {
    /// Local development: loopback only, any origin.
    pub fn development() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            cors_origins: vec!["*".to_string()],
            ..Default::default()
        }
    }
}
