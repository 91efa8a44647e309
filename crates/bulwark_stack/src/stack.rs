// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The multi-level cache stack contract.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheSettings, Fetch, StackError};

/// Values a [`CacheStack`] can hold.
///
/// Values are cloned out of the local tier and serialized into the shared tier. This trait is
/// implemented for every type meeting the bounds.
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// A read-through, multi-level cache.
///
/// Keys passed to a stack are already namespaced by the caller; a stack never rewrites them.
///
/// Implementations must guarantee that:
///
/// - concurrent [`get_or_set`](Self::get_or_set) calls for one key invoke the fetch at most
///   once and all callers observe the same result;
/// - a value older than its time-to-live is never returned;
/// - a value past its stale-after threshold is returned immediately while exactly one background
///   refresh, receiving the previous value, replaces it;
/// - a freshly fetched value is written to every layer;
/// - [`evict`](Self::evict) removes the key from every layer, so the next `get_or_set` invokes
///   the fetch again.
///
/// Shared-tier timeouts and connection failures must be reported as
/// [`StackError::Timeout`] or [`StackError::Connection`]; failures of the fetch itself as
/// [`StackError::Fetch`].
pub trait CacheStack: Send + Sync {
    /// Returns the cached value for `key`, invoking `fetch` when nothing usable is cached.
    fn get_or_set<T>(
        &self,
        key: &str,
        fetch: Fetch<T>,
        settings: CacheSettings,
    ) -> impl Future<Output = Result<T, StackError>> + Send
    where
        T: CacheValue;

    /// Removes `key` from every layer.
    fn evict(&self, key: &str) -> impl Future<Output = Result<(), StackError>> + Send;
}
