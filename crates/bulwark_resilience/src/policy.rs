// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use recoverable::{Recovery, RecoveryKind};
use tick::Clock;

use crate::breaker::{Admission, Breaker, Transition};
use crate::callbacks::{Callbacks, OnClosed, OnHalfOpen, OnOpened, OnRetry};
use crate::health::Outcome;
use crate::retry::retry_delay;
use crate::{
    CircuitSnapshot, CircuitState, InvalidOptions, OnClosedArgs, OnHalfOpenArgs, OnOpenedArgs, OnRetryArgs, PolicyError,
    ResilienceOptions, telemetry,
};

const DEFAULT_NAME: &str = "bulwark";

/// A circuit breaker wrapped around exponential-backoff retry.
///
/// Each call to [`execute`](Self::execute) is first admitted by the breaker. Inside, transient
/// failures (those whose [`Recovery`] kind is [`RecoveryKind::Retry`]) are retried up to
/// [`retry_count`](ResilienceOptions::retry_count) times. The breaker then records a single outcome
/// for the whole call: success, or failure if every attempt was transient and none succeeded.
/// Non-transient failures pass through without being retried or counted.
///
/// Clones share the same breaker.
///
/// # Examples
///
/// ```
/// # futures::executor::block_on(async {
/// use bulwark_resilience::{ResilienceOptions, ResiliencePolicy};
/// use recoverable::{Recovery, RecoveryInfo};
/// use tick::Clock;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("not found")]
/// struct NotFound;
///
/// impl Recovery for NotFound {
///     fn recovery(&self) -> RecoveryInfo {
///         RecoveryInfo::never()
///     }
/// }
///
/// let policy = ResiliencePolicy::new(&ResilienceOptions::default(), Clock::new_frozen())?;
///
/// let value = policy.execute(|| async { Ok::<_, NotFound>(42) }).await?;
/// assert_eq!(value, 42);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    name: Cow<'static, str>,
    retry_count: u32,
    retry_base_delay: Duration,
    break_duration: Duration,
    breaker: Breaker,
    clock: Clock,
    callbacks: Callbacks,
}

impl ResiliencePolicy {
    /// Creates a policy from `options` with no callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOptions`] if `options` do not validate.
    pub fn new(options: &ResilienceOptions, clock: Clock) -> Result<Self, InvalidOptions> {
        Self::builder(clock).options(options).build()
    }

    /// Starts building a policy that uses `clock` for backoff delays and breaker timing.
    #[must_use]
    pub fn builder(clock: Clock) -> ResiliencePolicyBuilder {
        ResiliencePolicyBuilder {
            name: Cow::Borrowed(DEFAULT_NAME),
            options: ResilienceOptions::default(),
            clock,
            callbacks: Callbacks::default(),
        }
    }

    /// The name reported in telemetry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The state the next call would observe.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.shared.breaker.snapshot().state
    }

    /// Current breaker state together with the health that drives it.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        self.shared.breaker.snapshot()
    }

    /// Runs `operation` under the policy.
    ///
    /// `operation` is invoked once per attempt.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::CircuitOpen`] if the breaker rejects the call; `operation` is not invoked.
    /// - [`PolicyError::Exhausted`] if every attempt failed with a transient error.
    /// - [`PolicyError::Failed`] on the first error that is not transient.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, PolicyError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recovery + Display,
    {
        let shared = &*self.shared;

        let probe = match shared.breaker.enter() {
            Admission::Rejected { retry_after } => {
                telemetry::rejected(&shared.name, retry_after);
                return Err(PolicyError::CircuitOpen { retry_after });
            }
            Admission::Accepted { probe, half_opened } => {
                if let Some(open_duration) = half_opened {
                    shared.half_opened(open_duration);
                }
                probe
            }
        };

        let result = shared.retry(&mut operation).await;

        let outcome = match &result {
            Ok(_) => Some(Outcome::Success),
            Err(PolicyError::Exhausted { .. }) => Some(Outcome::Failure),
            Err(_) => None,
        };

        match shared.breaker.exit(outcome, probe) {
            Transition::Unchanged => {}
            Transition::Opened(health) => {
                telemetry::opened(&shared.name, &health, shared.break_duration);
                if let Some(callback) = &shared.callbacks.on_opened {
                    callback.call(OnOpenedArgs {
                        failure_rate: health.failure_rate(),
                        throughput: health.throughput(),
                        break_duration: shared.break_duration,
                        reopened: false,
                    });
                }
            }
            Transition::Reopened => {
                telemetry::reopened(&shared.name, shared.break_duration);
                if let Some(callback) = &shared.callbacks.on_opened {
                    let snapshot = shared.breaker.snapshot();
                    callback.call(OnOpenedArgs {
                        failure_rate: snapshot.failure_rate,
                        throughput: snapshot.throughput,
                        break_duration: shared.break_duration,
                        reopened: true,
                    });
                }
            }
            Transition::Closed { open_for } => {
                telemetry::closed(&shared.name, open_for);
                if let Some(callback) = &shared.callbacks.on_closed {
                    callback.call(OnClosedArgs { open_duration: open_for });
                }
            }
        }

        result
    }
}

impl Shared {
    async fn retry<T, E, F, Fut>(&self, operation: &mut F) -> Result<T, PolicyError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recovery + Display,
    {
        let mut attempt: u32 = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let recovery = error.recovery();
            if recovery.kind() != RecoveryKind::Retry {
                return Err(PolicyError::Failed(error));
            }

            if attempt > self.retry_count {
                return Err(PolicyError::Exhausted { attempts: attempt, source: error });
            }

            let delay = retry_delay(&recovery, self.retry_base_delay, attempt);
            telemetry::retry(&self.name, attempt, delay, &error);

            if let Some(callback) = &self.callbacks.on_retry {
                callback.call(OnRetryArgs {
                    attempt,
                    retry_delay: delay,
                    recovery,
                    error: error.to_string(),
                });
            }

            drop(error);
            self.clock.delay(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    fn half_opened(&self, open_duration: Duration) {
        telemetry::half_open(&self.name, open_duration);
        if let Some(callback) = &self.callbacks.on_half_open {
            callback.call(OnHalfOpenArgs { open_duration });
        }
    }
}

/// Builder for [`ResiliencePolicy`].
#[derive(Debug)]
pub struct ResiliencePolicyBuilder {
    name: Cow<'static, str>,
    options: ResilienceOptions,
    clock: Clock,
    callbacks: Callbacks,
}

impl ResiliencePolicyBuilder {
    /// Replaces all tuning with `options`.
    #[must_use]
    pub fn options(mut self, options: &ResilienceOptions) -> Self {
        self.options = options.clone();
        self
    }

    /// Sets the name reported in telemetry. Defaults to `"bulwark"`.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Called before each retry delay.
    #[must_use]
    pub fn on_retry(mut self, callback: impl Fn(OnRetryArgs) + Send + Sync + 'static) -> Self {
        self.callbacks.on_retry = Some(OnRetry::new(callback));
        self
    }

    /// Called when the circuit opens, including when a failed probe reopens it.
    #[must_use]
    pub fn on_opened(mut self, callback: impl Fn(OnOpenedArgs) + Send + Sync + 'static) -> Self {
        self.callbacks.on_opened = Some(OnOpened::new(callback));
        self
    }

    /// Called when the break elapses and a probe is let through.
    #[must_use]
    pub fn on_half_open(mut self, callback: impl Fn(OnHalfOpenArgs) + Send + Sync + 'static) -> Self {
        self.callbacks.on_half_open = Some(OnHalfOpen::new(callback));
        self
    }

    /// Called when a successful probe closes the circuit.
    #[must_use]
    pub fn on_closed(mut self, callback: impl Fn(OnClosedArgs) + Send + Sync + 'static) -> Self {
        self.callbacks.on_closed = Some(OnClosed::new(callback));
        self
    }

    /// Builds the policy.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOptions`] if the configured options do not validate.
    pub fn build(self) -> Result<ResiliencePolicy, InvalidOptions> {
        self.options.validate()?;

        Ok(ResiliencePolicy {
            shared: Arc::new(Shared {
                name: self.name,
                retry_count: self.options.retry_count,
                retry_base_delay: self.options.retry_base_delay,
                break_duration: self.options.break_duration,
                breaker: Breaker::new(&self.options, self.clock.clone()),
                clock: self.clock,
                callbacks: self.callbacks,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_options_fail_to_build() {
        let options = ResilienceOptions {
            failure_threshold: 2.0,
            ..ResilienceOptions::default()
        };

        let error = ResiliencePolicy::new(&options, Clock::new_frozen()).unwrap_err();

        assert_eq!(error, InvalidOptions::FailureThreshold(2.0));
    }

    #[test]
    fn name_defaults_and_overrides() {
        let clock = Clock::new_frozen();

        assert_eq!(ResiliencePolicy::new(&ResilienceOptions::default(), clock.clone()).unwrap().name(), "bulwark");
        assert_eq!(ResiliencePolicy::builder(clock).name("orders").build().unwrap().name(), "orders");
    }

    #[test]
    fn clones_share_breaker_state() {
        let policy = ResiliencePolicy::new(&ResilienceOptions::default(), Clock::new_frozen()).unwrap();
        let clone = policy.clone();

        assert!(Arc::ptr_eq(&policy.shared, &clone.shared));
        assert_eq!(clone.circuit_state(), CircuitState::Closed);
    }
}
