// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error as StdError;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

/// The future returned by a [`Fetch`] invocation.
pub type FetchFuture<T> = BoxFuture<'static, Result<T, FetchError>>;

type FetchFn<T> = dyn Fn(Option<T>) -> FetchFuture<T> + Send + Sync;

/// A backing-source fetch: a function from the previously cached value, if any, to a future
/// producing the new value.
///
/// `Fetch` is cheap to clone and may be invoked any number of times. A stack passes `Some(previous)`
/// when refreshing a stale value and `None` when nothing usable is cached. The facade's direct
/// fallback path always passes `None`.
///
/// # Examples
///
/// ```
/// use bulwark_stack::Fetch;
///
/// # futures::executor::block_on(async {
/// let fetch = Fetch::new(|previous: Option<u32>| async move { Ok(previous.unwrap_or(0) + 1) });
///
/// assert_eq!(fetch.call(None).await.unwrap(), 1);
/// assert_eq!(fetch.call(Some(41)).await.unwrap(), 42);
/// # });
/// ```
pub struct Fetch<T> {
    inner: Arc<FetchFn<T>>,
}

impl<T> Fetch<T>
where
    T: Send + 'static,
{
    /// Wraps a function returning a future into a `Fetch`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |previous| f(previous).boxed()),
        }
    }

    /// Invokes the backing source.
    #[must_use]
    pub fn call(&self, previous: Option<T>) -> FetchFuture<T> {
        (self.inner)(previous)
    }
}

impl<T> Clone for Fetch<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Fetch<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch").finish_non_exhaustive()
    }
}

/// A failure raised by the backing source.
///
/// The underlying error is shared, so a single failure can be handed to every caller that was
/// waiting on the same coalesced fetch. Use [`downcast_ref`](Self::downcast_ref) to inspect the
/// original error type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("backing source fetch failed: {source}")]
pub struct FetchError {
    source: Arc<dyn StdError + Send + Sync>,
}

impl FetchError {
    /// Wraps an error or a message.
    pub fn new(cause: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Arc::from(cause.into()),
        }
    }

    /// Returns the original error if it is of type `E`.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}
