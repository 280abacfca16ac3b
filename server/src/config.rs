//! Configuration system for the chunk server.
//!
//! Supports:
//! - CLI arguments and environment variables (highest priority)
//! - TOML config file
//! - Defaults (lowest priority)

use anyhow::{Context, Result};
use clap::Parser;
use common::models::DEFAULT_CHUNK_SIZE;
use common::FileType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thermal_api::ApiConfig;

/// Default rebuild period: once a day.
pub const DEFAULT_REBUILD_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Command-line arguments for the chunk server.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "thermal-server")]
#[command(about = "Chunk server - splits CSV datasets into chunks and serves them over HTTP")]
#[command(version)]
pub struct CliArgs {
    /// HTTP port [default: 5001]
    #[arg(long, short = 'p', env = "THERMAL_PORT")]
    pub port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long, env = "THERMAL_HOST")]
    pub host: Option<String>,

    /// Configuration file path
    #[arg(long, short = 'c', default_value = "server.toml", env = "THERMAL_CONFIG")]
    pub config: PathBuf,

    /// Directory holding the source CSV files [default: ./public]
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Records per chunk [default: 5000]
    #[arg(long, env = "THERMAL_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Seconds between scheduled rebuilds, 0 disables them [default: 86400]
    #[arg(long, env = "THERMAL_REBUILD_INTERVAL")]
    pub rebuild_interval_secs: Option<u64>,

    /// Serve existing artifacts without chunking at startup
    #[arg(long)]
    pub skip_initial_build: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

/// Full server configuration (merged from all sources).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP API settings
    pub http: HttpConfig,

    /// Source and artifact locations
    pub data: DataConfig,

    /// Datasets to chunk and serve
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    /// Defaults to `{data_dir}/chunks`.
    pub chunks_dir: Option<PathBuf>,
    pub chunk_size: usize,
    pub rebuild_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetConfig {
    pub file_type: FileType,
    /// Relative paths resolve against `data.data_dir`.
    pub source: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let api = ApiConfig::default();
        Self {
            host: api.host,
            port: api.port,
            cors_origins: api.cors_origins,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: common::platform::default_data_dir(),
            chunks_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rebuild_interval_secs: DEFAULT_REBUILD_INTERVAL_SECS,
        }
    }
}

impl DatasetConfig {
    /// The two datasets the dashboard reads.
    pub fn defaults() -> Vec<Self> {
        [
            ("steady-state", "steady_state_data.csv"),
            ("clustering", "clustering_data.csv"),
        ]
        .into_iter()
        .filter_map(|(tag, source)| {
            FileType::new(tag).ok().map(|file_type| Self {
                file_type,
                source: PathBuf::from(source),
            })
        })
        .collect()
    }
}

impl ServerConfig {
    /// Load configuration from CLI args and optional config file.
    ///
    /// Priority: CLI args / environment > config file > defaults
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut config = if args.config.exists() {
            Self::from_file(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            Self::default()
        };

        if let Some(port) = args.port {
            config.http.port = port;
        }
        if let Some(ref host) = args.host {
            config.http.host = host.clone();
        }
        if let Some(ref data_dir) = args.data_dir {
            config.data.data_dir = data_dir.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            config.data.chunk_size = chunk_size;
        }
        if let Some(secs) = args.rebuild_interval_secs {
            config.data.rebuild_interval_secs = secs;
        }
        if config.datasets.is_empty() {
            config.datasets = DatasetConfig::defaults();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing sections keep defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Reject settings the builder or router cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.data.chunk_size == 0 {
            anyhow::bail!("data.chunk_size must be at least 1");
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            if self.datasets[..i].iter().any(|d| d.file_type == dataset.file_type) {
                anyhow::bail!("dataset '{}' is configured more than once", dataset.file_type);
            }
        }
        Ok(())
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.data
            .chunks_dir
            .clone()
            .unwrap_or_else(|| common::platform::chunks_dir(&self.data.data_dir))
    }

    /// Absolute (or cwd-relative) path of a dataset's source CSV.
    pub fn source_path(&self, dataset: &DatasetConfig) -> PathBuf {
        if dataset.source.is_absolute() {
            dataset.source.clone()
        } else {
            self.data.data_dir.join(&dataset.source)
        }
    }

    /// `None` when scheduled rebuilds are disabled.
    pub fn rebuild_interval(&self) -> Option<Duration> {
        match self.data.rebuild_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.http.host.clone(),
            port: self.http.port,
            enable_cors: !self.http.cors_origins.is_empty(),
            cors_origins: self.http.cors_origins.clone(),
        }
    }
}
