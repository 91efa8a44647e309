// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A resilient read-through cache facade.
//!
//! [`CacheFacade`] sits in front of an expensive or rate-limited backing source and a
//! multi-level [`CacheStack`](bulwark_stack::CacheStack). It keeps an outage of the cache
//! infrastructure from turning into an outage, or a stampede, of the backing source:
//!
//! 1. Every stack call runs under a [`ResiliencePolicy`](bulwark_resilience::ResiliencePolicy): a
//!    circuit breaker wrapping retry with exponential backoff. Only transient shared-tier
//!    failures are retried and counted by the breaker.
//! 2. When the policy gives up, a fresh entry in the process-local [`BufferCache`] is served and
//!    the backing source is not touched.
//! 3. Without a buffered value, the backing source is called directly and the result is buffered
//!    for the next caller.
//!
//! Successful results are mirrored into the buffer as they are returned, so the buffer is warm
//! before an outage begins.
//!
//! # Configuration
//!
//! [`CacheOptions`] carries the key prefix, the default time-to-live and stale-after thresholds
//! and the buffer lifetime; leaving `store_buffer_default` unset disables buffering.
//! [`SharedTierOptions`] describes the shared tier connection together with its resilience
//! tuning. With the `serde` feature both can be loaded from configuration files.
//!
//! # Telemetry
//!
//! Each operation logs a `tracing` event whose `cache.activity` field says how it was resolved:
//! `cache.hit`, `cache.buffer_hit`, `cache.direct_fetch`, `cache.evicted`, `cache.invalid`,
//! `cache.fallback` or `cache.error`. Absorbed failures are logged at `WARN` with the namespaced
//! key and the circuit state. With the `metrics` feature, `CacheFacadeBuilder::meter` also
//! records the `bulwark.cache.event.count` counter and the `bulwark.cache.operation.duration`
//! histogram.

mod buffer;
mod error;
mod facade;
mod key;
mod options;
mod telemetry;

#[doc(inline)]
pub use buffer::BufferCache;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use facade::{CacheFacade, CacheFacadeBuilder};
#[doc(inline)]
pub use key::CacheKey;
#[doc(inline)]
pub use options::{
    CacheOptions, ConfigError, Credential, DEFAULT_BUFFER_CAPACITY, DEFAULT_SHARED_TIER_PORT, DEFAULT_TIME_TO_LIVE, SharedTierOptions,
};

#[doc(no_inline)]
pub use bulwark_resilience::{CircuitSnapshot, CircuitState, PolicyError, ResilienceOptions, ResiliencePolicy};
#[doc(no_inline)]
pub use bulwark_stack::{CacheSettings, CacheStack, CacheValue, Fetch, FetchError, StackError};
