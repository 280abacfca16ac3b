//! Client side of the thermal data service.
//!
//! - [`ProgressiveFetcher`] downloads a chunked dataset in index order and
//!   streams progress and interim rows over a bounded channel.
//! - [`ViewCoordinator`] serves derived views cache-first, falling back to
//!   cached raw rows and then to the fetcher.
//! - [`SingleFlight`] collapses concurrent loads of the same key into one run.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod single_flight;

pub use config::{FetcherConfig, DEFAULT_SERVER_URL};
pub use coordinator::{Derivation, LoadContext, Loaded, RawTables, Source, ViewCoordinator};
pub use error::{CoordinatorError, CoordinatorResult, FetchError, FetchResult};
pub use fetcher::{chunk_progress, FetchEvent, FetchHandle, FetchState, ProgressiveFetcher};
pub use http::ChunkClient;
pub use single_flight::{FlightError, FlightStats, SingleFlight};
