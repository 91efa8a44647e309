// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An in-process [`CacheStack`] built from a local tier and a shared tier.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tick::Clock;

use crate::{CacheSettings, CacheStack, CacheValue, Fetch, StackEntry, StackError};

mod flight;
mod local;
mod shared;

use flight::FlightGroup;
use local::LocalTier;
pub use shared::{InMemorySharedTier, SharedTier};

/// How often [`LayeredStack::start_cleanup`] is typically run.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

const DEFAULT_LOCAL_CAPACITY: u64 = 10_000;

/// A two-level read-through cache stack.
///
/// Reads go to a bounded process-local tier first, then to the [`SharedTier`], and finally to
/// the backing source. Concurrent misses for one key share a single load, stale values are served
/// while one background refresh replaces them, fetched values are written through to both tiers
/// and evictions remove the key from both.
///
/// Background work (coalesced loads, refreshes and cleanup) runs on Tokio tasks, so the stack must
/// be used from within a Tokio runtime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark_stack::{CacheSettings, CacheStack, Fetch, InMemorySharedTier, LayeredStack};
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), bulwark_stack::StackError> {
/// let clock = Clock::new_tokio();
/// let stack = LayeredStack::builder(InMemorySharedTier::new(clock.clone()), clock)
///     .local_capacity(1_000)
///     .build();
///
/// let settings = CacheSettings::new(Duration::from_secs(300)).with_stale_after(Duration::from_secs(60));
/// let fetch = Fetch::new(|_previous: Option<f64>| async { Ok(1.08) });
///
/// assert_eq!(stack.get_or_set("fx:EUR:USD", fetch, settings).await?, 1.08);
///
/// stack.evict("fx:EUR:USD").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LayeredStack<S> {
    inner: Arc<StackInner<S>>,
}

impl<S> Clone for LayeredStack<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct StackInner<S> {
    local: LocalTier,
    shared: S,
    flights: FlightGroup,
    refreshing: Arc<Mutex<HashSet<String>>>,
    clock: Clock,
}

/// Builder for [`LayeredStack`].
#[derive(Debug)]
pub struct LayeredStackBuilder<S> {
    shared: S,
    clock: Clock,
    local_capacity: u64,
}

impl<S: SharedTier> LayeredStackBuilder<S> {
    /// Sets the maximum number of entries held by the local tier. Defaults to 10 000.
    #[must_use]
    pub fn local_capacity(mut self, capacity: u64) -> Self {
        self.local_capacity = capacity;
        self
    }

    /// Builds the stack.
    #[must_use]
    pub fn build(self) -> LayeredStack<S> {
        LayeredStack {
            inner: Arc::new(StackInner {
                local: LocalTier::new(self.local_capacity),
                shared: self.shared,
                flights: FlightGroup::new(),
                refreshing: Arc::new(Mutex::new(HashSet::new())),
                clock: self.clock,
            }),
        }
    }
}

impl<S: SharedTier> LayeredStack<S> {
    /// Starts building a stack over `shared`, timing entries with `clock`.
    #[must_use]
    pub fn builder(shared: S, clock: Clock) -> LayeredStackBuilder<S> {
        LayeredStackBuilder {
            shared,
            clock,
            local_capacity: DEFAULT_LOCAL_CAPACITY,
        }
    }

    /// The shared tier this stack writes through to.
    #[must_use]
    pub fn shared_tier(&self) -> &S {
        &self.inner.shared
    }

    /// Removes expired entries from the local tier and returns how many were removed.
    ///
    /// Expired entries are never served, so this only reclaims memory.
    pub fn cleanup(&self) -> usize {
        self.inner.local.purge_expired(self.inner.clock.system_time())
    }

    /// Runs [`cleanup`](Self::cleanup) every `interval` until the last handle to the stack is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start_cleanup(&self, interval: Duration) {
        let stack = Arc::downgrade(&self.inner);
        let clock = self.inner.clock.clone();

        tokio::spawn(async move {
            loop {
                clock.delay(interval).await;

                let Some(inner) = stack.upgrade() else {
                    break;
                };

                let purged = inner.local.purge_expired(inner.clock.system_time());
                tracing::debug!(cache.purged = purged, "cache.cleanup");
            }
        });
    }
}

impl<S: SharedTier> CacheStack for LayeredStack<S> {
    async fn get_or_set<T>(&self, key: &str, fetch: Fetch<T>, settings: CacheSettings) -> Result<T, StackError>
    where
        T: CacheValue,
    {
        settings.validate()?;

        let now = self.inner.clock.system_time();
        if let Some(entry) = self.inner.local.get::<T>(key, now) {
            if entry.is_stale(now) {
                self.inner.refresh(key, entry.value().clone(), fetch, settings);
            }
            return Ok(entry.into_value());
        }

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_owned();
        self.inner
            .flights
            .work(key, move || inner.load(owned_key, fetch, settings).boxed())
            .await
    }

    async fn evict(&self, key: &str) -> Result<(), StackError> {
        self.inner.local.remove(key);
        self.inner.shared.remove(key).await?;

        tracing::debug!(cache.key = key, "cache.evicted");
        Ok(())
    }
}

impl<S: SharedTier> StackInner<S> {
    async fn load<T: CacheValue>(self: Arc<Self>, key: String, fetch: Fetch<T>, settings: CacheSettings) -> Result<T, StackError> {
        let now = self.clock.system_time();

        // A load for this key may have completed between the local miss and joining this flight.
        if let Some(entry) = self.local.get::<T>(&key, now) {
            return Ok(entry.into_value());
        }

        if let Some(payload) = self.shared.get(&key).await? {
            match serde_json::from_slice::<StackEntry<T>>(&payload) {
                Ok(entry) if !entry.is_expired(now) => {
                    self.local.insert(&key, entry.clone());
                    if entry.is_stale(now) {
                        self.refresh(&key, entry.value().clone(), fetch, settings);
                    }
                    return Ok(entry.into_value());
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(cache.key = %key, error = %error, "cache.shared_decode_failed");
                }
            }
        }

        let value = fetch.call(None).await?;
        self.store(&key, value.clone(), settings).await;

        Ok(value)
    }

    async fn store<T: CacheValue>(&self, key: &str, value: T, settings: CacheSettings) {
        let entry = StackEntry::new(value, self.clock.system_time(), settings);

        match serde_json::to_vec(&entry) {
            Ok(payload) => {
                if let Err(error) = self.shared.set(key, payload, settings.time_to_live()).await {
                    tracing::warn!(cache.key = key, error = %error, "cache.shared_write_failed");
                }
            }
            Err(error) => {
                tracing::warn!(cache.key = key, error = %error, "cache.shared_encode_failed");
            }
        }

        self.local.insert(key, entry);
    }

    /// Spawns a background refresh of `key` unless one is already running.
    fn refresh<T: CacheValue>(self: &Arc<Self>, key: &str, previous: T, fetch: Fetch<T>, settings: CacheSettings) {
        if !self.refreshing.lock().insert(key.to_owned()) {
            return;
        }

        let guard = RefreshGuard {
            refreshing: Arc::clone(&self.refreshing),
            key: key.to_owned(),
        };
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            match fetch.call(Some(previous)).await {
                Ok(value) => {
                    inner.store(&guard.key, value, settings).await;
                    tracing::debug!(cache.key = %guard.key, "cache.refreshed");
                }
                Err(error) => {
                    tracing::warn!(cache.key = %guard.key, error = %error, "cache.refresh_failed");
                }
            }
        });
    }
}

/// Marks a key as no longer refreshing, even if the refresh task is dropped.
struct RefreshGuard {
    refreshing: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing.lock().remove(&self.key);
    }
}
