// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::StackError;

type ErasedResult = Result<Arc<dyn Any + Send + Sync>, StackError>;
type Flight = Shared<BoxFuture<'static, ErasedResult>>;

/// Coalesces concurrent loads of the same key into one.
///
/// The first caller for a key starts the load on a spawned task; later callers attach to it until
/// it completes. Because the load is driven by its own task, a caller that stops waiting never
/// cancels the load for the others.
///
/// A flight leaves the group before its result is handed out, so a caller arriving after
/// completion always starts a new load.
#[derive(Debug, Default)]
pub(crate) struct FlightGroup {
    flights: Arc<Mutex<HashMap<String, InFlight>>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    flight: Flight,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `load` for `key` unless a load for `key` is already in flight, in which case its result
    /// is awaited instead.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn work<T, F>(&self, key: &str, load: F) -> Result<T, StackError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<T, StackError>>,
    {
        let flight = self.join_or_start(key, load);

        let value = flight.await?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| StackError::TypeMismatch { key: key.to_owned() })
    }

    fn join_or_start<T, F>(&self, key: &str, load: F) -> Flight
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<T, StackError>>,
    {
        let mut flights = self.flights.lock();

        if let Some(in_flight) = flights.get(key) {
            return in_flight.flight.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let load = load();
        let group = Arc::clone(&self.flights);
        let owned_key = key.to_owned();

        let flight = async move {
            let result = load.await.map(|value| Arc::new(value) as Arc<dyn Any + Send + Sync>);

            // Leave the group before any waiter sees the result. A newer flight for the key is kept.
            let mut flights = group.lock();
            if flights.get(&owned_key).is_some_and(|in_flight| in_flight.id == id) {
                flights.remove(&owned_key);
            }
            drop(flights);

            result
        }
        .boxed()
        .shared();

        flights.insert(
            key.to_owned(),
            InFlight {
                id,
                flight: flight.clone(),
            },
        );
        drop(flights);

        let driver = flight.clone();
        tokio::spawn(async move {
            let _outcome = driver.await;
        });

        flight
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}
