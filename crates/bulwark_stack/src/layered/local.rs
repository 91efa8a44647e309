// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

use moka::sync::Cache;

use crate::StackEntry;

type ErasedValue = Arc<dyn Any + Send + Sync>;

/// The process-local layer of a [`LayeredStack`](super::LayeredStack).
///
/// Values of any type share one bounded map; a read with a type other than the one written is
/// a miss.
#[derive(Debug, Clone)]
pub(crate) struct LocalTier {
    entries: Cache<String, StackEntry<ErasedValue>>,
}

impl LocalTier {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Returns the unexpired entry for `key`, if it holds a `T`.
    pub fn get<T>(&self, key: &str, now: SystemTime) -> Option<StackEntry<T>>
    where
        T: Clone + 'static,
    {
        let entry = self.entries.get(key)?;

        if entry.is_expired(now) {
            self.entries.invalidate(key);
            return None;
        }

        let value = entry.value().downcast_ref::<T>()?.clone();
        Some(entry.map(|_| value))
    }

    pub fn insert<T>(&self, key: &str, entry: StackEntry<T>)
    where
        T: Send + Sync + 'static,
    {
        self.entries
            .insert(key.to_owned(), entry.map(|value| Arc::new(value) as ErasedValue));
    }

    pub fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Removes every entry that expired at or before `now`, returning how many were removed.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            self.entries.invalidate(key.as_str());
        }

        expired.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::CacheSettings;

    const T0: SystemTime = SystemTime::UNIX_EPOCH;

    fn entry<T>(value: T, ttl_secs: u64) -> StackEntry<T> {
        StackEntry::new(value, T0, CacheSettings::new(Duration::from_secs(ttl_secs)))
    }

    #[test]
    fn get_returns_inserted_value() {
        let tier = LocalTier::new(100);
        tier.insert("k", entry("v".to_string(), 60));

        let found = tier.get::<String>("k", T0).unwrap();

        assert_eq!(found.value(), "v");
    }

    #[test]
    fn get_with_other_type_is_miss() {
        let tier = LocalTier::new(100);
        tier.insert("k", entry(42_u32, 60));

        assert!(tier.get::<String>("k", T0).is_none());
        assert!(tier.get::<u32>("k", T0).is_some());
    }

    #[test]
    fn expired_entry_is_miss_and_removed() {
        let tier = LocalTier::new(100);
        tier.insert("k", entry(1_u8, 10));

        assert!(tier.get::<u8>("k", T0 + Duration::from_secs(10)).is_none());
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn purge_removes_only_expired() {
        let tier = LocalTier::new(100);
        tier.insert("short", entry(1_u8, 10));
        tier.insert("long", entry(2_u8, 100));

        let purged = tier.purge_expired(T0 + Duration::from_secs(30));

        assert_eq!(purged, 1);
        assert!(tier.get::<u8>("long", T0 + Duration::from_secs(30)).is_some());
    }

    #[test]
    fn remove_drops_entry() {
        let tier = LocalTier::new(100);
        tier.insert("k", entry(1_u8, 10));
        tier.remove("k");

        assert!(tier.get::<u8>("k", T0).is_none());
    }
}
