// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Retry with exponential backoff, wrapped in a circuit breaker.
//!
//! [`ResiliencePolicy`] guards calls into infrastructure that can fail transiently, such as a
//! remote cache. Errors are classified through [`recoverable::Recovery`]: only errors whose
//! recovery kind is [`Retry`](recoverable::RecoveryKind::Retry) are retried, everything else is
//! returned to the caller untouched.
//!
//! Around the retries sits a circuit breaker. It samples call outcomes over a rolling window and
//! opens when the failure rate reaches the configured threshold, provided enough calls were seen.
//! While open, calls fail immediately with [`PolicyError::CircuitOpen`]. After the break duration
//! a single probe call is let through; its success closes the circuit and its failure opens it
//! again.
//!
//! ```
//! use std::time::Duration;
//!
//! use bulwark_resilience::{PolicyError, ResilienceOptions, ResiliencePolicy};
//! use recoverable::{Recovery, RecoveryInfo};
//! use tick::ClockControl;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("connection reset")]
//! struct Reset;
//!
//! impl Recovery for Reset {
//!     fn recovery(&self) -> RecoveryInfo {
//!         RecoveryInfo::retry()
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let clock = ClockControl::new().auto_advance_timers(true).to_clock();
//! let options = ResilienceOptions {
//!     retry_count: 2,
//!     retry_base_delay: Duration::from_millis(100),
//!     ..ResilienceOptions::default()
//! };
//! let policy = ResiliencePolicy::new(&options, clock).unwrap();
//!
//! let result: Result<(), _> = policy.execute(|| async { Err(Reset) }).await;
//!
//! assert!(matches!(result, Err(PolicyError::Exhausted { attempts: 3, .. })));
//! # });
//! ```
//!
//! # Telemetry
//!
//! The policy emits `tracing` events named `bulwark.retry`, `bulwark.circuit.opened`,
//! `bulwark.circuit.half_open`, `bulwark.circuit.closed` and `bulwark.circuit.rejected`. The same
//! transitions can be observed in code through the `on_*` callbacks on
//! [`ResiliencePolicyBuilder`].
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for [`ResilienceOptions`], with durations written as
//!   friendly strings such as `"15m"`. See [`serde_duration`].

mod args;
mod breaker;
mod callbacks;
mod error;
mod health;
mod options;
mod policy;
mod retry;
#[cfg(feature = "serde")]
pub mod serde_duration;
mod telemetry;

#[doc(inline)]
pub use args::{OnClosedArgs, OnHalfOpenArgs, OnOpenedArgs, OnRetryArgs};
#[doc(inline)]
pub use breaker::{CircuitSnapshot, CircuitState};
#[doc(inline)]
pub use error::PolicyError;
#[doc(inline)]
pub use options::{
    DEFAULT_BREAK_DURATION, DEFAULT_FAILURE_THRESHOLD, DEFAULT_MINIMUM_THROUGHPUT, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_COUNT,
    DEFAULT_SAMPLING_DURATION, InvalidOptions, MIN_SAMPLING_DURATION, ResilienceOptions,
};
#[doc(inline)]
pub use policy::{ResiliencePolicy, ResiliencePolicyBuilder};
