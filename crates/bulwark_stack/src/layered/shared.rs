// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tick::Clock;

use crate::StackError;
use crate::entry::add_saturating;

/// The shared, possibly remote, layer of a [`LayeredStack`](super::LayeredStack).
///
/// A shared tier stores opaque payloads with a time-to-live. Implementations for remote stores
/// report timeouts as [`StackError::Timeout`] and unreachable servers as
/// [`StackError::Connection`] so that callers can retry them.
pub trait SharedTier: Send + Sync + 'static {
    /// Reads the payload stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StackError>> + Send;

    /// Stores `payload` under `key` for at most `ttl`.
    fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> impl Future<Output = Result<(), StackError>> + Send;

    /// Removes `key`.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StackError>> + Send;
}

/// A process-shared, in-memory [`SharedTier`].
///
/// Clones share the same storage, so several [`LayeredStack`](super::LayeredStack) instances
/// built over clones of one `InMemorySharedTier` behave like processes sharing one remote store.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark_stack::{InMemorySharedTier, SharedTier};
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let tier = InMemorySharedTier::new(Clock::new_frozen());
/// tier.set("key", b"payload".to_vec(), Duration::from_secs(60)).await.unwrap();
///
/// assert_eq!(tier.get("key").await.unwrap(), Some(b"payload".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemorySharedTier {
    entries: Arc<Mutex<HashMap<String, StoredPayload>>>,
    clock: Clock,
}

#[derive(Debug)]
struct StoredPayload {
    payload: Vec<u8>,
    expires_at: SystemTime,
}

impl InMemorySharedTier {
    /// Creates an empty tier whose expiry follows `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Returns the number of stored payloads, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` holds an unexpired payload.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.system_time();
        self.entries.lock().get(key).is_some_and(|stored| stored.expires_at > now)
    }
}

impl SharedTier for InMemorySharedTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StackError> {
        let now = self.clock.system_time();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(stored) if stored.expires_at > now => Ok(Some(stored.payload.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), StackError> {
        let now = self.clock.system_time();
        let expires_at = add_saturating(now, ttl);

        self.entries
            .lock()
            .insert(key.to_owned(), StoredPayload { payload, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StackError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
