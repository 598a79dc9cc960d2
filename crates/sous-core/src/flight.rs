//! Single-flight registry: at most one execution per key, with every caller
//! for that key attached to the same outcome.
//!
//! Each in-flight key owns a `watch` channel holding `None` until the
//! execution settles. Attaching, settling and dropping all happen under one
//! registry lock, so a caller either sees the settled result through the
//! `recheck` hook or subscribes to a channel that has not yet been released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

type Flights<T> = Arc<Mutex<HashMap<String, watch::Sender<Option<T>>>>>;

/// What a caller gets when it attaches to a key.
pub enum Attach<T> {
    /// The result is already available.
    Ready(T),
    /// No execution was running; the caller must start one with `flight`.
    Lead {
        flight: Flight<T>,
        waiter: watch::Receiver<Option<T>>,
    },
    /// An execution is already running for this key.
    Follow(watch::Receiver<Option<T>>),
}

pub struct FlightRegistry<T> {
    flights: Flights<T>,
}

impl<T> Default for FlightRegistry<T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> FlightRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to `key`. `recheck` runs under the registry lock before anything
    /// else and short-circuits with [`Attach::Ready`] when it finds a result.
    pub fn attach(&self, key: &str, recheck: impl FnOnce() -> Option<T>) -> Attach<T> {
        let mut flights = lock(&self.flights);
        if let Some(value) = recheck() {
            return Attach::Ready(value);
        }
        if let Some(tx) = flights.get(key) {
            tracing::debug!(key, waiters = tx.receiver_count() + 1, "Joining in-flight request");
            return Attach::Follow(tx.subscribe());
        }

        let (tx, waiter) = watch::channel(None);
        flights.insert(key.to_string(), tx.clone());
        Attach::Lead {
            flight: Flight {
                key: key.to_string(),
                tx,
                flights: Arc::clone(&self.flights),
                settled: false,
            },
            waiter,
        }
    }

    /// Number of keys currently executing.
    pub fn len(&self) -> usize {
        lock(&self.flights).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The executor's handle on an in-flight key.
///
/// Dropping it without [`settle`](Self::settle) removes the key, which closes
/// the channel and detaches every waiter.
pub struct Flight<T> {
    key: String,
    tx: watch::Sender<Option<T>>,
    flights: Flights<T>,
    settled: bool,
}

impl<T> Flight<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolves once every waiter has gone away.
    pub async fn abandoned(&self) {
        self.tx.closed().await
    }

    /// Publish the outcome. `commit` runs first, then the key is removed, both
    /// under the registry lock; waiters are released last.
    pub fn settle(mut self, outcome: T, commit: impl FnOnce(&T)) {
        {
            let mut flights = lock(&self.flights);
            commit(&outcome);
            flights.remove(&self.key);
            self.settled = true;
        }
        self.tx.send_replace(Some(outcome));
    }
}

impl<T> Drop for Flight<T> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(key = %self.key, "In-flight request ended without a result");
            lock(&self.flights).remove(&self.key);
        }
    }
}

/// Acquires the registry lock, recovering from poison if necessary.
fn lock<T>(flights: &Flights<T>) -> MutexGuard<'_, HashMap<String, watch::Sender<Option<T>>>> {
    flights.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned flight registry mutex");
        poisoned.into_inner()
    })
}
