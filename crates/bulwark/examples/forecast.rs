// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Caches a slow weather forecast service and keeps answering while the shared tier is down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bulwark::{CacheFacade, CacheOptions, CacheSettings, Fetch, ResilienceOptions, StackError};
use bulwark_stack::{InMemorySharedTier, LayeredStack, SharedTier};
use tick::Clock;

/// A shared tier that can be switched off to simulate an outage.
#[derive(Debug, Clone)]
struct SwitchableTier {
    inner: InMemorySharedTier,
    online: Arc<AtomicBool>,
}

impl SwitchableTier {
    fn check(&self) -> Result<(), StackError> {
        if self.online.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StackError::connection("shared tier unreachable"))
        }
    }
}

impl SharedTier for SwitchableTier {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StackError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), StackError> {
        self.check()?;
        self.inner.set(key, payload, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), StackError> {
        self.check()?;
        self.inner.remove(key).await
    }
}

fn forecast_source(calls: Arc<AtomicU32>) -> Fetch<String> {
    Fetch::new(move |_previous: Option<String>| {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(format!("sunny, 21C (vendor call #{call})"))
        }
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let clock = Clock::new_tokio();
    let online = Arc::new(AtomicBool::new(true));
    let tier = SwitchableTier {
        inner: InMemorySharedTier::new(clock.clone()),
        online: Arc::clone(&online),
    };

    // Keep the demo quick: retry once with a short backoff.
    let resilience = ResilienceOptions {
        retry_count: 1,
        retry_base_delay: Duration::from_millis(100),
        ..ResilienceOptions::default()
    };

    let cache = CacheFacade::builder(LayeredStack::builder(tier, clock.clone()).local_capacity(1_000).build(), clock)
        .name("forecasts")
        .options(CacheOptions {
            key_prefix: "forecast:".to_string(),
            store_buffer_default: Some(Duration::from_secs(60 * 60)),
            ..CacheOptions::default()
        })
        .resilience(&resilience)
        .build()?;

    let calls = Arc::new(AtomicU32::new(0));
    let fetch = forecast_source(Arc::clone(&calls));
    let settings = CacheSettings::new(Duration::from_secs(10 * 60)).with_stale_after(Duration::from_secs(5 * 60));

    println!("first read:   {}", cache.get_or_set("seattle", fetch.clone(), settings).await?);
    println!("cached read:  {}", cache.get_or_set("seattle", fetch.clone(), settings).await?);

    cache.evict("seattle").await?;
    println!("after evict:  {}", cache.get_or_set("seattle", fetch.clone(), settings).await?);

    online.store(false, Ordering::Relaxed);
    println!("during outage: {}", cache.get_or_set("seattle", fetch.clone(), settings).await?);
    println!("new key during outage: {}", cache.get_or_set("portland", fetch, settings).await?);

    println!("vendor calls: {}, circuit: {}", calls.load(Ordering::SeqCst), cache.circuit_state());

    Ok(())
}
