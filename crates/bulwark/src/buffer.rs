// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use moka::sync::Cache;
use tick::Clock;

/// Process-local, short-lived store that shields the backing source while the cache stack is
/// unavailable.
///
/// Entries carry their own expiry, independent of the settings used by the stack. Values of any
/// type share one bounded map; reading a key with a type other than the one written returns
/// `None`. The buffer may be empty at any time; it is never authoritative.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::BufferCache;
/// use tick::Clock;
///
/// let buffer = BufferCache::new(100, Clock::new_frozen());
/// buffer.set("weather:seattle", 21_u8, Duration::from_secs(60));
///
/// assert_eq!(buffer.get::<u8>("weather:seattle"), Some(21));
/// assert_eq!(buffer.get::<String>("weather:seattle"), None);
/// ```
#[derive(Clone)]
pub struct BufferCache {
    entries: Cache<String, BufferEntry>,
    clock: Clock,
}

#[derive(Clone)]
struct BufferEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Option<SystemTime>,
}

impl BufferCache {
    /// Creates a buffer holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64, clock: Clock) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
            clock,
        }
    }

    /// Returns the unexpired value stored under `key`, if it is a `T`.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let now = self.clock.system_time();
        let entry = self.entries.get(key)?;

        if entry.expires_at.is_some_and(|expires_at| now >= expires_at) {
            return None;
        }

        entry.value.downcast_ref::<T>().cloned()
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    pub fn set<T>(&self, key: &str, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        let expires_at = self.clock.system_time().checked_add(ttl);

        self.entries.insert(
            key.to_owned(),
            BufferEntry {
                value: Arc::new(value),
                expires_at,
            },
        );
    }

    /// Removes the entry for `key`.
    pub fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Number of entries currently held, including expired ones not yet replaced.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

impl Debug for BufferCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("entry_count", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    #[test]
    fn value_expires_after_its_own_ttl() {
        let control = ClockControl::new();
        let buffer = BufferCache::new(10, control.to_clock());
        buffer.set("k", "v".to_string(), Duration::from_secs(60));

        control.advance(Duration::from_secs(59));
        assert_eq!(buffer.get::<String>("k").as_deref(), Some("v"));

        control.advance(Duration::from_secs(1));
        assert_eq!(buffer.get::<String>("k"), None);
    }

    #[test]
    fn wrong_type_reads_as_absent() {
        let buffer = BufferCache::new(10, Clock::new_frozen());
        buffer.set("k", 7_u32, Duration::from_secs(60));

        assert_eq!(buffer.get::<u64>("k"), None);
        assert_eq!(buffer.get::<u32>("k"), Some(7));
    }

    #[test]
    fn set_replaces_previous_value() {
        let buffer = BufferCache::new(10, Clock::new_frozen());
        buffer.set("k", 1_u8, Duration::from_secs(60));
        buffer.set("k", 2_u8, Duration::from_secs(60));

        assert_eq!(buffer.get::<u8>("k"), Some(2));
        assert_eq!(buffer.entry_count(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let buffer = BufferCache::new(10, Clock::new_frozen());
        buffer.set("k", 1_u8, Duration::from_secs(60));

        buffer.remove("k");

        assert_eq!(buffer.get::<u8>("k"), None);
    }

    #[test]
    fn huge_ttl_never_expires() {
        let control = ClockControl::new();
        let buffer = BufferCache::new(10, control.to_clock());
        buffer.set("k", 1_u8, Duration::MAX);

        control.advance(Duration::from_secs(365 * 24 * 3600));

        assert_eq!(buffer.get::<u8>("k"), Some(1));
    }
}
