// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Per-entry caching settings: how long a value lives and when it becomes stale.
///
/// An entry older than [`time_to_live`](Self::time_to_live) is never served. An entry older than
/// [`stale_after`](Self::stale_after) but younger than its time-to-live is served immediately
/// while a single background refresh replaces it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark_stack::CacheSettings;
///
/// let settings = CacheSettings::new(Duration::from_secs(300)).with_stale_after(Duration::from_secs(60));
/// assert!(settings.validate().is_ok());
///
/// let invalid = CacheSettings::new(Duration::from_secs(60)).with_stale_after(Duration::from_secs(90));
/// assert!(invalid.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheSettings {
    time_to_live: Duration,
    stale_after: Option<Duration>,
}

impl CacheSettings {
    /// Creates settings with the given time-to-live and no stale-after threshold.
    #[must_use]
    pub const fn new(time_to_live: Duration) -> Self {
        Self {
            time_to_live,
            stale_after: None,
        }
    }

    /// Sets the age after which a cached value is refreshed in the background.
    #[must_use]
    pub const fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    /// Sets or clears the stale-after threshold.
    #[must_use]
    pub const fn with_stale_after_opt(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// The maximum age of a value that may be served.
    #[must_use]
    pub const fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    /// The age after which a value is refreshed in the background, if any.
    #[must_use]
    pub const fn stale_after(&self) -> Option<Duration> {
        self.stale_after
    }

    /// Checks the settings invariants.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSettings`] when the time-to-live is zero or the stale-after threshold
    /// exceeds the time-to-live.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.time_to_live.is_zero() {
            return Err(InvalidSettings::ZeroTimeToLive);
        }

        match self.stale_after {
            Some(stale_after) if stale_after > self.time_to_live => Err(InvalidSettings::StaleAfterExceedsTimeToLive {
                stale_after,
                time_to_live: self.time_to_live,
            }),
            _ => Ok(()),
        }
    }
}

/// The reason [`CacheSettings`] were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidSettings {
    /// The time-to-live was zero.
    #[error("time to live must be greater than zero")]
    ZeroTimeToLive,

    /// The stale-after threshold was larger than the time-to-live.
    #[error("stale after ({stale_after:?}) must not exceed time to live ({time_to_live:?})")]
    StaleAfterExceedsTimeToLive {
        /// The rejected stale-after threshold.
        stale_after: Duration,
        /// The time-to-live it was compared against.
        time_to_live: Duration,
    },
}
