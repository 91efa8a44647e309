// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Behavior of the layered reference stack through its public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bulwark_stack::{CacheSettings, CacheStack, Fetch, FetchError, InMemorySharedTier, LayeredStack, SharedTier, StackError};
use futures::future::join_all;
use testing_aids::LogCapture;
use tick::{Clock, ClockControl};
use tracing_subscriber::util::SubscriberInitExt;

fn stack(clock: &Clock) -> LayeredStack<InMemorySharedTier> {
    LayeredStack::builder(InMemorySharedTier::new(clock.clone()), clock.clone()).build()
}

/// A fetch that returns `previous + 1`, or `0` when there is no previous value.
fn incrementing() -> (Fetch<u32>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let fetch = Fetch::new(move |previous: Option<u32>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::task::yield_now().await;
            Ok(previous.map_or(0, |p| p + 1))
        }
    });

    (fetch, calls)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn concurrent_misses_share_one_fetch() {
    let clock = Clock::new_frozen();
    let stack = stack(&clock);
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60));

    let results = join_all((0..10).map(|_| stack.get_or_set("k", fetch.clone(), settings))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| matches!(r, Ok(0))));
}

#[tokio::test]
async fn stale_value_is_served_while_one_refresh_runs() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let stack = stack(&clock);
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60)).with_stale_after(Duration::from_secs(10));

    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);

    control.advance(Duration::from_secs(15));

    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);
    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);

    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(stack.get_or_set("k", fetch, settings).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_stale_reads_share_one_refresh() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let stack = stack(&clock);
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60)).with_stale_after(Duration::from_secs(10));

    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);
    control.advance(Duration::from_secs(15));

    let results = join_all((0..16).map(|_| stack.get_or_set("k", fetch.clone(), settings))).await;
    settle().await;

    assert!(results.iter().all(|r| matches!(r, Ok(0))), "every caller gets the stale value");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn expired_value_is_refetched() {
    let control = ClockControl::new();
    let clock = control.to_clock();
    let stack = stack(&clock);
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60));

    stack.get_or_set("k", fetch.clone(), settings).await.unwrap();
    control.advance(Duration::from_secs(61));
    let value = stack.get_or_set("k", fetch, settings).await.unwrap();

    assert_eq!(value, 0, "an expired value is not handed to the fetch");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn evict_removes_key_from_both_tiers() {
    let clock = Clock::new_frozen();
    let stack = stack(&clock);
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60));

    stack.get_or_set("k", fetch.clone(), settings).await.unwrap();
    assert!(stack.shared_tier().contains_key("k"));

    stack.evict("k").await.unwrap();
    assert!(!stack.shared_tier().contains_key("k"));

    stack.get_or_set("k", fetch, settings).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn evict_then_get_refetches_with_immediate_fetch() {
    let clock = Clock::new_frozen();
    let stack = stack(&clock);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetch = Fetch::new(move |_: Option<usize>| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(n) }
    });
    let settings = CacheSettings::new(Duration::from_secs(60));

    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);
    stack.evict("k").await.unwrap();
    assert_eq!(stack.get_or_set("k", fetch, settings).await.unwrap(), 1);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_stack_reads_value_written_by_first() {
    let clock = Clock::new_frozen();
    let shared = InMemorySharedTier::new(clock.clone());
    let first = LayeredStack::builder(shared.clone(), clock.clone()).build();
    let second = LayeredStack::builder(shared, clock).build();
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60));

    first.get_or_set("k", fetch.clone(), settings).await.unwrap();
    let value = second.get_or_set("k", fetch, settings).await.unwrap();

    assert_eq!(value, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unbounded_time_to_live_is_shared_across_stacks() {
    let clock = Clock::new_frozen();
    let shared = InMemorySharedTier::new(clock.clone());
    let first = LayeredStack::builder(shared.clone(), clock.clone()).build();
    let second = LayeredStack::builder(shared, clock).build();
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::MAX);

    first.get_or_set("k", fetch.clone(), settings).await.unwrap();
    let value = second.get_or_set("k", fetch, settings).await.unwrap();

    assert_eq!(value, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_failure_is_not_cached() {
    let clock = Clock::new_frozen();
    let stack = stack(&clock);
    let settings = CacheSettings::new(Duration::from_secs(60));
    let failing = Fetch::new(|_: Option<String>| async { Err(FetchError::new("source offline")) });
    let working = Fetch::new(|_: Option<String>| async { Ok("ok".to_string()) });

    let error = stack.get_or_set("k", failing, settings).await.unwrap_err();
    assert!(matches!(error, StackError::Fetch(_)));
    assert!(stack.shared_tier().is_empty());

    assert_eq!(stack.get_or_set("k", working, settings).await.unwrap(), "ok");
}

/// A shared tier whose reads or writes can be made to fail.
#[derive(Debug, Clone)]
struct FlakyTier {
    inner: InMemorySharedTier,
    fail_reads: bool,
    fail_writes: bool,
}

impl SharedTier for FlakyTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StackError> {
        if self.fail_reads {
            return Err(StackError::timeout("read timed out"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), StackError> {
        if self.fail_writes {
            return Err(StackError::connection("connection reset"));
        }
        self.inner.set(key, payload, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), StackError> {
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn shared_read_timeout_propagates_without_fetching() {
    let clock = Clock::new_frozen();
    let tier = FlakyTier {
        inner: InMemorySharedTier::new(clock.clone()),
        fail_reads: true,
        fail_writes: false,
    };
    let stack = LayeredStack::builder(tier, clock).build();
    let (fetch, calls) = incrementing();

    let error = stack
        .get_or_set("k", fetch, CacheSettings::new(Duration::from_secs(60)))
        .await
        .unwrap_err();

    assert!(matches!(error, StackError::Timeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shared_write_failure_still_returns_value() {
    let capture = LogCapture::new();
    let _guard = capture.subscriber().set_default();

    let clock = Clock::new_frozen();
    let tier = FlakyTier {
        inner: InMemorySharedTier::new(clock.clone()),
        fail_reads: false,
        fail_writes: true,
    };
    let stack = LayeredStack::builder(tier, clock).build();
    let (fetch, calls) = incrementing();
    let settings = CacheSettings::new(Duration::from_secs(60));

    assert_eq!(stack.get_or_set("k", fetch.clone(), settings).await.unwrap(), 0);
    assert_eq!(stack.get_or_set("k", fetch, settings).await.unwrap(), 0);

    assert_eq!(calls.load(Ordering::SeqCst), 1, "the local tier still holds the value");
    capture.assert_contains("cache.shared_write_failed");
}
