// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test doubles for code built on [`CacheStack`].
//!
//! [`MockStack`] is an in-memory stack that records every operation and can be told to fail,
//! which makes the retry, circuit-breaking and fallback paths of a caller easy to drive. The
//! [`counted`] helpers build [`Fetch`] functions that count their invocations.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{CacheSettings, CacheStack, CacheValue, Fetch, FetchError, StackError};

/// An operation recorded by [`MockStack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOp {
    /// `get_or_set` was called with the given key.
    GetOrSet(String),
    /// `evict` was called with the given key.
    Evict(String),
}

impl StackOp {
    /// The key the operation targeted.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::GetOrSet(key) | Self::Evict(key) => key,
        }
    }
}

type FailPredicate = Box<dyn Fn(&StackOp) -> bool + Send + Sync>;
type StoredValue = Arc<dyn Any + Send + Sync>;

/// A recording, failure-injecting [`CacheStack`].
///
/// Values are kept in a single map and never expire. A `get_or_set` miss invokes the fetch once
/// and stores the result; a fetch failure is reported as [`StackError::Fetch`]. Clones share
/// storage, recorded operations and failure configuration.
///
/// Every call is recorded before failure injection is consulted, so [`attempts`](Self::attempts)
/// counts calls that failed too.
pub struct MockStack {
    data: Arc<Mutex<HashMap<String, StoredValue>>>,
    operations: Arc<Mutex<Vec<StackOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
    fail_next: Arc<AtomicUsize>,
    fail_with: Arc<Mutex<StackError>>,
}

impl Debug for MockStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStack")
            .field("keys", &self.data.lock().keys().collect::<Vec<_>>())
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("fail_next", &self.fail_next)
            .field("fail_with", &self.fail_with)
            .finish()
    }
}

impl Clone for MockStack {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            fail_next: Arc::clone(&self.fail_next),
            fail_with: Arc::clone(&self.fail_with),
        }
    }
}

impl Default for MockStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStack {
    /// Creates an empty stack that never fails.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            fail_next: Arc::new(AtomicUsize::new(0)),
            fail_with: Arc::new(Mutex::new(StackError::timeout("mock: shared tier timed out"))),
        }
    }

    /// Fails every operation for which `predicate` returns `true`.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StackOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Fails the next `count` operations, whatever they are.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sets the error injected failures return. Defaults to a [`StackError::Timeout`].
    pub fn fail_with(&self, error: StackError) {
        *self.fail_with.lock() = error;
    }

    /// Removes all failure injection.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
        self.fail_next.store(0, Ordering::SeqCst);
    }

    /// Returns every recorded operation in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<StackOp> {
        self.operations.lock().clone()
    }

    /// Clears the recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Returns how many times `get_or_set` was called for `key`.
    #[must_use]
    pub fn attempts(&self, key: &str) -> usize {
        self.operations
            .lock()
            .iter()
            .filter(|op| matches!(op, StackOp::GetOrSet(k) if k == key))
            .count()
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Stores `value` under `key` without recording an operation.
    pub fn seed<T: CacheValue>(&self, key: &str, value: T) {
        self.data.lock().insert(key.to_owned(), Arc::new(value));
    }

    fn record(&self, op: StackOp) -> Result<(), StackError> {
        self.operations.lock().push(op.clone());

        let scheduled = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let matched = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));

        if scheduled || matched {
            return Err(self.fail_with.lock().clone());
        }

        Ok(())
    }
}

impl CacheStack for MockStack {
    async fn get_or_set<T>(&self, key: &str, fetch: Fetch<T>, settings: CacheSettings) -> Result<T, StackError>
    where
        T: CacheValue,
    {
        self.record(StackOp::GetOrSet(key.to_owned()))?;
        settings.validate()?;

        let cached = self.data.lock().get(key).cloned();
        if let Some(value) = cached {
            return value
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| StackError::TypeMismatch { key: key.to_owned() });
        }

        let value = fetch.call(None).await?;
        self.seed(key, value.clone());

        Ok(value)
    }

    async fn evict(&self, key: &str) -> Result<(), StackError> {
        self.record(StackOp::Evict(key.to_owned()))?;
        self.data.lock().remove(key);

        Ok(())
    }
}

/// Returns a fetch that always yields `value`, and a counter of its invocations.
pub fn counted<T>(value: T) -> (Fetch<T>, Arc<AtomicUsize>)
where
    T: Clone + Send + Sync + 'static,
{
    counted_with(move |_| Ok(value.clone()))
}

/// Returns a fetch backed by `f`, and a counter of its invocations.
pub fn counted_with<T, F>(f: F) -> (Fetch<T>, Arc<AtomicUsize>)
where
    T: Send + 'static,
    F: Fn(Option<T>) -> Result<T, FetchError> + Send + Sync + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let fetch = Fetch::new(move |previous| {
        counter.fetch_add(1, Ordering::SeqCst);
        let result = f(previous);
        async move { result }
    });

    (fetch, calls)
}
