// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default delay before the first retry; later retries double it (2s, 4s, 8s).
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default share of failed calls in the sampling window that opens the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.1;

/// Default length of the window over which the failure rate is computed.
pub const DEFAULT_SAMPLING_DURATION: Duration = Duration::from_secs(15 * 60);

/// Default time the circuit stays open before a probe is let through.
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(5 * 60);

/// Default number of calls in the sampling window before the failure rate is considered.
pub const DEFAULT_MINIMUM_THROUGHPUT: u32 = 100;

/// Smallest sampling duration the breaker works with; shorter durations are raised to it.
pub const MIN_SAMPLING_DURATION: Duration = Duration::from_secs(1);

/// Tuning for a [`ResiliencePolicy`](crate::ResiliencePolicy).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark_resilience::ResilienceOptions;
///
/// let options = ResilienceOptions {
///     retry_count: 2,
///     break_duration: Duration::from_secs(30),
///     ..ResilienceOptions::default()
/// };
///
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResilienceOptions {
    /// Retries after the first attempt for transient failures. Zero disables retrying.
    pub retry_count: u32,

    /// Delay before the first retry; each further retry doubles it, so retry `n` waits
    /// `retry_base_delay * 2^(n - 1)`. With the default of 2s the waits are 2s, 4s and 8s.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_duration"))]
    pub retry_base_delay: Duration,

    /// Failure rate in `(0, 1]` at which the circuit opens.
    pub failure_threshold: f64,

    /// Rolling window over which failures are counted.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_duration"))]
    pub sampling_duration: Duration,

    /// How long the circuit stays open.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_duration"))]
    pub break_duration: Duration,

    /// Calls required in the window before the circuit may open.
    pub minimum_throughput: u32,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            sampling_duration: DEFAULT_SAMPLING_DURATION,
            break_duration: DEFAULT_BREAK_DURATION,
            minimum_throughput: DEFAULT_MINIMUM_THROUGHPUT,
        }
    }
}

impl ResilienceOptions {
    /// Checks that the options describe a working policy.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOptions`] when the failure threshold is outside `(0, 1]` or a breaker
    /// duration is zero.
    pub fn validate(&self) -> Result<(), InvalidOptions> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(InvalidOptions::FailureThreshold(self.failure_threshold));
        }

        if self.break_duration.is_zero() {
            return Err(InvalidOptions::ZeroBreakDuration);
        }

        if self.sampling_duration.is_zero() {
            return Err(InvalidOptions::ZeroSamplingDuration);
        }

        Ok(())
    }

    pub(crate) fn effective_sampling_duration(&self) -> Duration {
        self.sampling_duration.max(MIN_SAMPLING_DURATION)
    }
}

/// Why a set of [`ResilienceOptions`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidOptions {
    /// The failure threshold is not in `(0, 1]`.
    #[error("failure threshold must be greater than 0 and at most 1, got {0}")]
    FailureThreshold(f64),

    /// The break duration is zero.
    #[error("break duration must be greater than zero")]
    ZeroBreakDuration,

    /// The sampling duration is zero.
    #[error("sampling duration must be greater than zero")]
    ZeroSamplingDuration,
}
