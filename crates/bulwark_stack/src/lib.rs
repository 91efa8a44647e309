// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The multi-level cache stack contract consumed by the `bulwark` cache facade.
//!
//! This crate defines the [`CacheStack`] trait: a read-through, multi-level cache that coalesces
//! concurrent fetches for the same key, serves stale values while refreshing them in the
//! background, writes through to every layer and evicts from every layer. Alongside the contract
//! it provides the vocabulary shared by stack implementations and their callers:
//!
//! - [`CacheSettings`] - per-entry time-to-live and optional stale-after threshold.
//! - [`Fetch`] - a re-invocable backing-source function from an optional previous value to a
//!   future value.
//! - [`StackError`] - failures classified through [`recoverable::Recovery`] as transient
//!   infrastructure failures or everything else.
//!
//! # Reference Stack
//!
//! [`LayeredStack`] is an in-process implementation of the contract built from a bounded local
//! tier and a pluggable [`SharedTier`]. It is suitable for tests, local development and as a
//! template for real deployments where the shared tier is a remote store.
//!
//! ```
//! use std::time::Duration;
//!
//! use bulwark_stack::{CacheSettings, CacheStack, Fetch, InMemorySharedTier, LayeredStack};
//! use tick::Clock;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), bulwark_stack::StackError> {
//! let clock = Clock::new_tokio();
//! let stack = LayeredStack::builder(InMemorySharedTier::new(clock.clone()), clock).build();
//!
//! let fetch = Fetch::new(|_previous: Option<String>| async { Ok("forecast".to_string()) });
//! let settings = CacheSettings::new(Duration::from_secs(60));
//!
//! let value = stack.get_or_set("weather", fetch, settings).await?;
//! assert_eq!(value, "forecast");
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-util` feature for the [`testing`] module, which provides a recording
//! [`MockStack`](testing::MockStack) with failure injection.

mod entry;
mod error;
mod fetch;
mod layered;
mod settings;
mod stack;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use entry::StackEntry;
#[doc(inline)]
pub use error::StackError;
#[doc(inline)]
pub use fetch::{Fetch, FetchError, FetchFuture};
#[doc(inline)]
pub use layered::{DEFAULT_CLEANUP_INTERVAL, InMemorySharedTier, LayeredStack, LayeredStackBuilder, SharedTier};
#[doc(inline)]
pub use settings::{CacheSettings, InvalidSettings};
#[doc(inline)]
pub use stack::{CacheStack, CacheValue};
