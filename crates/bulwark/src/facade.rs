// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulwark_resilience::{CircuitSnapshot, CircuitState, PolicyError, ResilienceOptions, ResiliencePolicy};
use bulwark_stack::{CacheSettings, CacheStack, CacheValue, Fetch, FetchError, StackError};
use tick::Clock;

use crate::key::KeyPrefix;
use crate::telemetry::{CacheActivity, CacheEvent, CacheOperation, CacheTelemetry};
use crate::{BufferCache, CacheKey, CacheOptions, ConfigError, Error, SharedTierOptions};

const DEFAULT_NAME: &str = "bulwark";

/// Read-through cache facade that keeps serving when the cache stack fails.
///
/// Every call into the [`CacheStack`] runs under a [`ResiliencePolicy`]: transient shared-tier
/// failures are retried with backoff and, when they persist, a circuit breaker sheds load. When
/// the policy gives up, the facade falls back to its [`BufferCache`] and, failing that, calls the
/// backing source directly. During such an outage each process fetches independently; coalescing
/// across callers resumes once the stack recovers.
///
/// Keys passed to the facade are logical keys; the configured prefix is applied once per
/// operation. Clones share the stack, the policy and the buffer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::{CacheFacade, CacheOptions};
/// use bulwark_stack::{InMemorySharedTier, LayeredStack};
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let clock = Clock::new_tokio();
/// let stack = LayeredStack::builder(InMemorySharedTier::new(clock.clone()), clock.clone()).build();
///
/// let cache = CacheFacade::builder(stack, clock)
///     .options(CacheOptions {
///         key_prefix: "weather:".to_string(),
///         store_buffer_default: Some(Duration::from_secs(3600)),
///         ..CacheOptions::default()
///     })
///     .build()?;
///
/// let forecast = cache
///     .get_or_set_with("seattle", |_previous| async { Ok("rain".to_string()) }, cache.default_settings())
///     .await?;
///
/// assert_eq!(forecast, "rain");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CacheFacade<S> {
    inner: Arc<FacadeInner<S>>,
}

impl<S> Clone for CacheFacade<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct FacadeInner<S> {
    stack: S,
    policy: ResiliencePolicy,
    prefix: KeyPrefix,
    defaults: CacheSettings,
    buffer: Option<Buffer>,
    fallback: bool,
    telemetry: CacheTelemetry,
    clock: Clock,
}

#[derive(Debug)]
struct Buffer {
    cache: BufferCache,
    ttl: Duration,
    write_through: bool,
}

impl Buffer {
    /// Replaces whatever the buffer holds for `key` with a fresh primary result.
    fn supersede<T: CacheValue>(&self, key: &CacheKey, value: &T) {
        if self.write_through {
            self.cache.set(key.as_str(), value.clone(), self.ttl);
        } else {
            self.cache.remove(key.as_str());
        }
    }
}

impl<S> CacheFacade<S>
where
    S: CacheStack,
{
    /// Starts building a facade over `stack`.
    #[must_use]
    pub fn builder(stack: S, clock: Clock) -> CacheFacadeBuilder<S> {
        CacheFacadeBuilder {
            stack,
            clock,
            name: Cow::Borrowed(DEFAULT_NAME),
            options: CacheOptions::default(),
            resilience: ResilienceOptions::default(),
            shared_tier: None,
            policy: None,
            #[cfg(feature = "metrics")]
            meter: None,
        }
    }

    /// Returns the value cached under `key`, fetching and caching it on a miss.
    ///
    /// `fetch` receives the previous value when the stack refreshes a stale entry, and `None`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `settings` are invalid. Nothing is called.
    /// - With fallback enabled, an error is returned only when no buffered value exists and the
    ///   direct fetch fails: [`Error::BackingSource`] if the stack failed because the fetch failed,
    ///   [`Error::Fatal`] otherwise.
    /// - With fallback disabled, the failure of the stack as [`Error::TransientInfra`],
    ///   [`Error::BackingSource`] or [`Error::Stack`].
    pub async fn get_or_set<T>(&self, key: &str, fetch: Fetch<T>, settings: CacheSettings) -> Result<T, Error>
    where
        T: CacheValue,
    {
        let inner = &*self.inner;
        let key = inner.prefix.apply(key);

        if let Err(invalid) = settings.validate() {
            inner.record(CacheOperation::GetOrSet, CacheActivity::Invalid, &key, None, Some(&invalid));
            return Err(Error::Validation(invalid));
        }

        let started = inner.clock.instant();
        let stack = &inner.stack;
        let namespaced = key.as_str();
        let primary_fetch = fetch.clone();

        let result = inner
            .policy
            .execute(move || stack.get_or_set(namespaced, primary_fetch.clone(), settings))
            .await;

        match result {
            Ok(value) => {
                if let Some(buffer) = &inner.buffer {
                    buffer.supersede(&key, &value);
                }
                inner.record(CacheOperation::GetOrSet, CacheActivity::Hit, &key, Some(started), None);
                Ok(value)
            }
            Err(primary) => inner.fall_back(key, fetch, primary, started).await,
        }
    }

    /// Like [`get_or_set`](Self::get_or_set), with the fetch given as a closure.
    ///
    /// # Errors
    ///
    /// See [`get_or_set`](Self::get_or_set).
    pub async fn get_or_set_with<T, F, Fut>(&self, key: &str, fetch: F, settings: CacheSettings) -> Result<T, Error>
    where
        T: CacheValue,
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.get_or_set(key, Fetch::new(fetch), settings).await
    }

    /// Like [`get_or_set`](Self::get_or_set), using [`default_settings`](Self::default_settings).
    ///
    /// # Errors
    ///
    /// See [`get_or_set`](Self::get_or_set).
    pub async fn get_or_set_default<T>(&self, key: &str, fetch: Fetch<T>) -> Result<T, Error>
    where
        T: CacheValue,
    {
        self.get_or_set(key, fetch, self.inner.defaults).await
    }

    /// Removes `key` from every layer of the stack.
    ///
    /// The buffer is left untouched; its entries expire on their own.
    ///
    /// # Errors
    ///
    /// [`Error::TransientInfra`] if the shared tier kept failing or the circuit is open,
    /// [`Error::Stack`] for other stack failures.
    pub async fn evict(&self, key: &str) -> Result<(), Error> {
        let inner = &*self.inner;
        let key = inner.prefix.apply(key);
        let started = inner.clock.instant();
        let stack = &inner.stack;
        let namespaced = key.as_str();

        match inner.policy.execute(move || stack.evict(namespaced)).await {
            Ok(()) => {
                inner.record(CacheOperation::Evict, CacheActivity::Evicted, &key, Some(started), None);
                Ok(())
            }
            Err(failure) => {
                let error = Error::from_policy(failure);
                inner.record(CacheOperation::Evict, CacheActivity::Error, &key, Some(started), Some(&error));
                Err(error)
            }
        }
    }
}

impl<S> CacheFacade<S> {
    /// Settings built from the configured time-to-live and stale-after defaults.
    #[must_use]
    pub fn default_settings(&self) -> CacheSettings {
        self.inner.defaults
    }

    /// The name reported in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.name()
    }

    /// State of the circuit guarding the stack.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.policy.circuit_state()
    }

    /// Circuit state with the health figures behind it.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.inner.policy.snapshot()
    }

    /// The policy guarding the stack.
    #[must_use]
    pub fn policy(&self) -> &ResiliencePolicy {
        &self.inner.policy
    }

    /// The fallback buffer, if buffering is enabled.
    #[must_use]
    pub fn buffer(&self) -> Option<&BufferCache> {
        self.inner.buffer.as_ref().map(|buffer| &buffer.cache)
    }

    /// The underlying stack.
    #[must_use]
    pub fn stack(&self) -> &S {
        &self.inner.stack
    }
}

impl<S> FacadeInner<S> {
    async fn fall_back<T>(&self, key: CacheKey, fetch: Fetch<T>, primary: PolicyError<StackError>, started: Instant) -> Result<T, Error>
    where
        T: CacheValue,
    {
        if !self.fallback {
            let error = Error::from_policy(primary);
            self.record(CacheOperation::GetOrSet, CacheActivity::Error, &key, Some(started), Some(&error));
            return Err(error);
        }

        self.record(CacheOperation::GetOrSet, CacheActivity::Fallback, &key, None, Some(&primary));

        if let Some(buffer) = &self.buffer
            && let Some(value) = buffer.cache.get::<T>(key.as_str())
        {
            self.record(CacheOperation::GetOrSet, CacheActivity::BufferHit, &key, Some(started), None);
            return Ok(value);
        }

        match fetch.call(None).await {
            Ok(value) => {
                if let Some(buffer) = &self.buffer {
                    buffer.cache.set(key.as_str(), value.clone(), buffer.ttl);
                }
                self.record(CacheOperation::GetOrSet, CacheActivity::DirectFetch, &key, Some(started), None);
                Ok(value)
            }
            Err(direct) => {
                let error = match primary {
                    PolicyError::Failed(StackError::Fetch(_)) => Error::BackingSource(direct),
                    primary => Error::Fatal {
                        key: key.clone(),
                        source: direct,
                        primary,
                    },
                };
                self.record(CacheOperation::GetOrSet, CacheActivity::Error, &key, Some(started), Some(&error));
                Err(error)
            }
        }
    }

    fn record(
        &self,
        operation: CacheOperation,
        activity: CacheActivity,
        key: &CacheKey,
        started: Option<Instant>,
        error: Option<&dyn std::error::Error>,
    ) {
        let duration = started.map(|started| self.clock.instant().saturating_duration_since(started));

        self.telemetry.record(&CacheEvent {
            operation,
            activity,
            key: key.as_str(),
            circuit: self.policy.circuit_state().as_str(),
            duration,
            error,
        });
    }
}

/// Builder for [`CacheFacade`].
///
/// The policy guarding the stack comes from, in order of precedence: [`policy`](Self::policy),
/// the resilience tuning of [`shared_tier`](Self::shared_tier), [`resilience`](Self::resilience),
/// or [`ResilienceOptions::default`].
#[derive(Debug)]
pub struct CacheFacadeBuilder<S> {
    stack: S,
    clock: Clock,
    name: Cow<'static, str>,
    options: CacheOptions,
    resilience: ResilienceOptions,
    shared_tier: Option<SharedTierOptions>,
    policy: Option<ResiliencePolicy>,
    #[cfg(feature = "metrics")]
    meter: Option<opentelemetry::metrics::Meter>,
}

impl<S> CacheFacadeBuilder<S>
where
    S: CacheStack,
{
    /// Sets the key prefix, defaults and buffer behavior.
    #[must_use]
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Tunes the retry and circuit breaker policy.
    #[must_use]
    pub fn resilience(mut self, options: &ResilienceOptions) -> Self {
        self.resilience = options.clone();
        self
    }

    /// Validates `options` on [`build`](Self::build) and adopts their resilience tuning.
    #[must_use]
    pub fn shared_tier(mut self, options: &SharedTierOptions) -> Self {
        self.shared_tier = Some(options.clone());
        self
    }

    /// Uses an existing policy, for example one shared with other facades over the same
    /// dependency or one with callbacks attached.
    #[must_use]
    pub fn policy(mut self, policy: ResiliencePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the name reported in logs and metrics. Defaults to `"bulwark"`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Records the `bulwark.cache.event.count` and `bulwark.cache.operation.duration` metrics.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter(mut self, meter: &opentelemetry::metrics::Meter) -> Self {
        self.meter = Some(meter.clone());
        self
    }

    /// Builds the facade.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the cache options, the shared tier options or the resilience
    /// options are invalid.
    pub fn build(self) -> Result<CacheFacade<S>, ConfigError> {
        self.options.validate()?;

        let resilience = match &self.shared_tier {
            Some(shared_tier) => {
                shared_tier.validate()?;
                &shared_tier.resilience
            }
            None => &self.resilience,
        };

        let policy = match self.policy {
            Some(policy) => policy,
            None => ResiliencePolicy::builder(self.clock.clone())
                .name(self.name.clone())
                .options(resilience)
                .build()?,
        };

        let buffer = self.options.store_buffer_default.map(|ttl| Buffer {
            cache: BufferCache::new(self.options.buffer_capacity, self.clock.clone()),
            ttl,
            write_through: self.options.buffer_write_through,
        });

        let telemetry = CacheTelemetry::new(self.name);
        #[cfg(feature = "metrics")]
        let telemetry = match &self.meter {
            Some(meter) => telemetry.with_meter(meter),
            None => telemetry,
        };

        Ok(CacheFacade {
            inner: Arc::new(FacadeInner {
                stack: self.stack,
                policy,
                prefix: KeyPrefix::new(&self.options.key_prefix),
                defaults: self.options.default_settings(),
                buffer,
                fallback: self.options.fallback,
                telemetry,
                clock: self.clock,
            }),
        })
    }
}
