// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::RecoveryInfo;

/// Arguments for the [`on_retry`](crate::ResiliencePolicyBuilder::on_retry) callback.
#[derive(Debug)]
pub struct OnRetryArgs {
    pub(crate) attempt: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) recovery: RecoveryInfo,
    pub(crate) error: String,
}

impl OnRetryArgs {
    /// The attempt that failed, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// How long the policy waits before the next attempt.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// The classification of the failure.
    #[must_use]
    pub fn recovery(&self) -> &RecoveryInfo {
        &self.recovery
    }

    /// The failure, rendered for display.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }
}

/// Arguments for the [`on_opened`](crate::ResiliencePolicyBuilder::on_opened) callback.
#[derive(Debug)]
pub struct OnOpenedArgs {
    pub(crate) failure_rate: f64,
    pub(crate) throughput: u32,
    pub(crate) break_duration: Duration,
    pub(crate) reopened: bool,
}

impl OnOpenedArgs {
    /// Failure rate of the window that opened the circuit.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Calls in the window that opened the circuit.
    #[must_use]
    pub fn throughput(&self) -> u32 {
        self.throughput
    }

    /// How long calls will be rejected.
    #[must_use]
    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// `true` when a failed half-open probe opened the circuit again.
    #[must_use]
    pub fn is_reopened(&self) -> bool {
        self.reopened
    }
}

/// Arguments for the [`on_half_open`](crate::ResiliencePolicyBuilder::on_half_open) callback.
#[derive(Debug)]
pub struct OnHalfOpenArgs {
    pub(crate) open_duration: Duration,
}

impl OnHalfOpenArgs {
    /// How long the circuit was open.
    #[must_use]
    pub fn open_duration(&self) -> Duration {
        self.open_duration
    }
}

/// Arguments for the [`on_closed`](crate::ResiliencePolicyBuilder::on_closed) callback.
#[derive(Debug)]
pub struct OnClosedArgs {
    pub(crate) open_duration: Duration,
}

impl OnClosedArgs {
    /// How long the circuit was open or half-open before the probe succeeded.
    #[must_use]
    pub fn open_duration(&self) -> Duration {
        self.open_duration
    }
}
