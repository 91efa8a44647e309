// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::CacheSettings;

/// A value stored by a cache stack, together with its lifetime metadata.
///
/// Timestamps are wall-clock times taken from the stack's [`Clock`](tick::Clock) so that entries
/// written by one process can be judged fresh or stale by another.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use bulwark_stack::{CacheSettings, StackEntry};
///
/// let created = SystemTime::UNIX_EPOCH;
/// let settings = CacheSettings::new(Duration::from_secs(60)).with_stale_after(Duration::from_secs(10));
/// let entry = StackEntry::new("value", created, settings);
///
/// assert!(!entry.is_stale(created + Duration::from_secs(5)));
/// assert!(entry.is_stale(created + Duration::from_secs(10)));
/// assert!(entry.is_expired(created + Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry<T> {
    value: T,
    created_at: SystemTime,
    expires_at: SystemTime,
    stale_at: Option<SystemTime>,
}

impl<T> StackEntry<T> {
    /// Creates an entry created at `created_at` whose lifetime follows `settings`.
    pub fn new(value: T, created_at: SystemTime, settings: CacheSettings) -> Self {
        Self {
            value,
            created_at,
            expires_at: add_saturating(created_at, settings.time_to_live()),
            stale_at: settings.stale_after().map(|stale_after| add_saturating(created_at, stale_after)),
        }
    }

    /// The cached value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the entry, returning the cached value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// When the value was produced.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// When the value stops being served.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// When the value becomes eligible for a background refresh, if ever.
    #[must_use]
    pub fn stale_at(&self) -> Option<SystemTime> {
        self.stale_at
    }

    /// Returns `true` once `now` has reached the expiry time.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` once `now` has reached the stale time.
    #[must_use]
    pub fn is_stale(&self, now: SystemTime) -> bool {
        self.stale_at.is_some_and(|stale_at| now >= stale_at)
    }

    /// The time remaining until expiry, zero when already expired.
    #[must_use]
    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.expires_at.duration_since(now).unwrap_or_default()
    }

    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> StackEntry<U> {
        StackEntry {
            value: f(self.value),
            created_at: self.created_at,
            expires_at: self.expires_at,
            stale_at: self.stale_at,
        }
    }
}

/// Longest lifetime an entry is given; longer durations, up to `Duration::MAX`, are capped to it.
const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) fn add_saturating(time: SystemTime, duration: Duration) -> SystemTime {
    time.checked_add(duration.min(MAX_LIFETIME)).unwrap_or(time)
}
