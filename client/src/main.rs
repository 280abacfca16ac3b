//! thermal-fetch
//!
//! Command-line front end for the client cache: progressively download a
//! dataset into the cache, inspect what is stored, and expire or clear it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::FileType;
use std::path::PathBuf;
use std::sync::Arc;
use thermal_client::{FetchEvent, FetchState, FetcherConfig, ProgressiveFetcher, DEFAULT_SERVER_URL};
use thermal_data_cache::{raw_key, CacheConfig, ContentCache};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "thermal-fetch")]
#[command(about = "Fetch chunked thermal datasets into the local cache")]
#[command(version)]
struct Cli {
    /// Base URL of the chunk server
    #[arg(long, env = "THERMAL_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Cache directory [default: platform cache dir]
    #[arg(long, env = "THERMAL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a dataset chunk by chunk and store it in the cache
    Fetch {
        file_type: FileType,
    },
    /// Show cache statistics and raw dataset entries
    Info {
        file_types: Vec<FileType>,
    },
    /// Remove cache entries
    Clear {
        /// Remove every entry
        #[arg(long, conflicts_with = "keys")]
        all: bool,
        keys: Vec<String>,
    },
    /// Remove expired entries
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermal_client=info,thermal_data_cache=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cache_config = match cli.cache_dir {
        Some(dir) => CacheConfig::at(dir),
        None => CacheConfig::default(),
    };
    let cache = Arc::new(ContentCache::new(cache_config));
    cache
        .initialize()
        .await
        .with_context(|| format!("Failed to open cache at {}", cache.config().path.display()))?;

    if !matches!(cli.command, Command::Sweep) {
        match cache.clear_expired().await {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "Expired cache entries removed"),
            Err(e) => warn!(error = %e, "Expiry sweep failed"),
        }
    }

    match cli.command {
        Command::Fetch { file_type } => fetch(cache.clone(), &cli.server, file_type).await?,
        Command::Info { file_types } => show_info(&cache, &file_types).await?,
        Command::Clear { all, keys } => {
            if all {
                cache.clear_all().await?;
                println!("Cleared all entries");
            } else {
                for key in &keys {
                    cache.clear(key).await?;
                    println!("Cleared {key}");
                }
            }
        }
        Command::Sweep => {
            let removed = cache.clear_expired().await?;
            println!("Removed {removed} expired entries");
        }
    }

    cache.flush().await?;
    Ok(())
}

async fn fetch(cache: Arc<ContentCache>, server: &str, file_type: FileType) -> Result<()> {
    let fetcher = ProgressiveFetcher::new(FetcherConfig::with_base_url(server), Some(cache))
        .context("Failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        on_signal.cancel();
    });

    let mut handle = fetcher.spawn(file_type.clone(), cancel);
    while let Some(event) = handle.events.recv().await {
        match event {
            FetchEvent::Progress(pct) => eprintln!("{file_type}: {pct:>3}%"),
            FetchEvent::Rows { first_index, rows } => {
                tracing::debug!(%file_type, first_index, records = rows.len(), "Rows received")
            }
            FetchEvent::State(FetchState::Error(message)) => eprintln!("{file_type}: error: {message}"),
            FetchEvent::State(state) => tracing::debug!(%file_type, ?state, "State changed"),
        }
    }

    let rows = handle
        .join
        .await
        .context("Fetch task panicked")?
        .with_context(|| format!("Failed to fetch {file_type}"))?;
    println!("{file_type}: {} records cached under {}", rows.len(), raw_key(&file_type));
    Ok(())
}

async fn show_info(cache: &ContentCache, file_types: &[FileType]) -> Result<()> {
    let stats = cache.stats().await?;
    println!("Cache: {}", cache.config().path.display());
    println!("Entries: {}", stats.entries);
    println!("Size on disk: {} bytes", stats.size_on_disk);

    for file_type in file_types {
        let key = raw_key(file_type);
        match cache.get_metadata(&key).await? {
            Some(meta) => println!(
                "{key}: hash={} stored_at={} ttl_ms={}",
                meta.hash, meta.timestamp, meta.expire_time
            ),
            None => println!("{key}: not cached"),
        }
    }
    Ok(())
}
