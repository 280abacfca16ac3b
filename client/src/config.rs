use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5001";

/// Settings for the progressive fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the chunk server, without a trailing slash
    pub base_url: String,

    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,

    /// Capacity of the bounded event channel
    pub event_buffer: usize,

    /// Rows coalesced before an interim batch is forwarded (after chunk 0)
    pub interim_min_records: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            event_buffer: 16,
            interim_min_records: 100,
        }
    }
}

impl FetcherConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
