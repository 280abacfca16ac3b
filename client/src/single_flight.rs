//! Single-flight execution of keyed loads.
//!
//! The first caller for a key becomes the leader and runs the work. Callers
//! that arrive while it is in flight subscribe to the leader's broadcast and
//! receive the same value. If the leader is dropped before finishing (its
//! future cancelled, or it panicked) the channel closes and waiters see
//! [`FlightError::Abandoned`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// What a waiter gets instead of a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlightError {
    #[error("leader failed: {0}")]
    Failed(String),
    #[error("leader abandoned the load")]
    Abandoned,
}

type Outcome<V> = Result<V, String>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlightStats {
    /// Calls that ran the work themselves
    pub leaders: u64,
    /// Calls that waited on another caller
    pub coalesced: u64,
}

pub struct SingleFlight<V> {
    in_flight: DashMap<String, broadcast::Sender<Outcome<V>>>,
    leaders: AtomicU64,
    coalesced: AtomicU64,
}

enum Role<V> {
    Leader(broadcast::Sender<Outcome<V>>),
    Follower(broadcast::Receiver<Outcome<V>>),
}

/// Removes the key on drop so waiters are released if the leader never
/// completes.
struct LeaderGuard<'a, V> {
    flights: &'a SingleFlight<V>,
    key: &'a str,
    sender: Option<broadcast::Sender<Outcome<V>>>,
}

impl<V: Clone> LeaderGuard<'_, V> {
    fn complete(mut self, outcome: Outcome<V>) {
        self.flights.in_flight.remove(self.key);
        if let Some(tx) = self.sender.take() {
            let waiters = tx.receiver_count();
            // Receivers may all be gone already
            let _ = tx.send(outcome);
            if waiters > 0 {
                tracing::debug!(key = self.key, waiters, "Shared result with waiting loads");
            }
        }
    }
}

impl<V> Drop for LeaderGuard<'_, V> {
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            self.flights.in_flight.remove(self.key);
            tracing::debug!(key = self.key, "Load abandoned, releasing waiters");
        }
    }
}

impl<V: Clone + Send + 'static> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            leaders: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    fn register(&self, key: &str) -> Role<V> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                Role::Follower(entry.get().subscribe())
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx.clone());
                self.leaders.fetch_add(1, Ordering::Relaxed);
                Role::Leader(tx)
            }
        }
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// wait for that run's outcome.
    ///
    /// The leader gets its own typed error back; waiters get the leader's
    /// error message as [`FlightError::Failed`].
    pub async fn run<F, Fut, E>(&self, key: &str, work: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<FlightError> + Display,
    {
        match self.register(key) {
            Role::Follower(mut rx) => {
                tracing::debug!(key, "Joining in-flight load");
                match rx.recv().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(message)) => Err(FlightError::Failed(message).into()),
                    Err(_) => Err(FlightError::Abandoned.into()),
                }
            }
            Role::Leader(tx) => {
                let guard = LeaderGuard {
                    flights: self,
                    key,
                    sender: Some(tx),
                };
                let result = work().await;
                let shared = match &result {
                    Ok(value) => Ok(value.clone()),
                    Err(e) => Err(e.to_string()),
                };
                guard.complete(shared);
                result
            }
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> FlightStats {
        FlightStats {
            leaders: self.leaders.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}
