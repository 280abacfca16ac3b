//! Thin reqwest wrapper for the manifest and chunk endpoints.

use crate::config::FetcherConfig;
use crate::error::{FetchError, FetchResult};
use common::{FileType, Manifest, Record};
use reqwest::Client;

const USER_AGENT: &str = concat!("thermal-fetch/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct ChunkClient {
    client: Client,
    config: FetcherConfig,
}

impl ChunkClient {
    pub fn new(config: FetcherConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// GET `/{fileType}-data-metadata`.
    ///
    /// Every failure, including a manifest that does not describe
    /// `file_type` or breaks its own invariants, is reported as
    /// [`FetchError::MetadataUnavailable`].
    pub async fn manifest(&self, file_type: &FileType) -> FetchResult<Manifest> {
        let url = self.config.url(&format!("{file_type}-data-metadata"));
        tracing::debug!(%file_type, %url, "Requesting manifest");

        let unavailable = |reason: String| FetchError::MetadataUnavailable(reason);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        let manifest: Manifest = response.json().await.map_err(|e| unavailable(e.to_string()))?;

        if manifest.file_type != *file_type {
            return Err(unavailable(format!(
                "manifest describes '{}', expected '{}'",
                manifest.file_type, file_type
            )));
        }
        manifest.validate().map_err(|e| unavailable(e.to_string()))?;
        Ok(manifest)
    }

    /// GET `/{fileType}-data/{index}`.
    pub async fn chunk(&self, file_type: &FileType, index: usize) -> FetchResult<Vec<Record>> {
        let url = self.config.url(&format!("{file_type}-data/{index}"));
        let unavailable = |reason: String| FetchError::ChunkUnavailable { index, reason };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }
        response.json().await.map_err(|e| unavailable(e.to_string()))
    }
}
