// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Logs and optional metrics for facade operations.

use std::borrow::Cow;
use std::time::Duration;

use tracing::Level;

#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

pub(crate) const CACHE_NAME: &str = "cache.name";
pub(crate) const CACHE_OPERATION: &str = "cache.operation";
pub(crate) const CACHE_ACTIVITY: &str = "cache.activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    GetOrSet,
    Evict,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetOrSet => "cache.get_or_set",
            Self::Evict => "cache.evict",
        }
    }
}

/// How an operation was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    /// Served by the cache stack.
    Hit,
    /// Served from the buffer after the stack failed.
    BufferHit,
    /// Served by calling the backing source directly after the stack failed.
    DirectFetch,
    Evicted,
    /// Rejected before any I/O.
    Invalid,
    /// The stack failed and the facade is falling back.
    Fallback,
    /// The caller receives an error.
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::BufferHit => "cache.buffer_hit",
            Self::DirectFetch => "cache.direct_fetch",
            Self::Evicted => "cache.evicted",
            Self::Invalid => "cache.invalid",
            Self::Fallback => "cache.fallback",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Evicted => Level::DEBUG,
            Self::BufferHit | Self::DirectFetch | Self::Fallback => Level::WARN,
            Self::Invalid | Self::Error => Level::ERROR,
        }
    }
}

/// One resolved operation, as it is logged and counted.
#[derive(Debug)]
pub(crate) struct CacheEvent<'a> {
    pub operation: CacheOperation,
    pub activity: CacheActivity,
    pub key: &'a str,
    pub circuit: &'a str,
    pub duration: Option<Duration>,
    pub error: Option<&'a dyn std::error::Error>,
}

#[derive(Debug, Clone)]
pub(crate) struct CacheTelemetry {
    name: Cow<'static, str>,
    #[cfg(feature = "metrics")]
    metrics: Option<metrics::CacheMetrics>,
}

impl CacheTelemetry {
    pub fn new(name: Cow<'static, str>) -> Self {
        Self {
            name,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_meter(mut self, meter: &opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(metrics::CacheMetrics::new(meter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self, event: &CacheEvent<'_>) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record(&self.name, event.operation, event.activity, event.duration);
        }

        self.emit(event);
    }

    fn emit(&self, event: &CacheEvent<'_>) {
        let name = self.name.as_ref();
        let operation = event.operation.as_str();
        let activity = event.activity.as_str();
        let duration = event.duration.map(|d| d.as_secs_f64());
        let error = event.error.map(tracing::field::display);

        // The level of a tracing event must be a constant.
        macro_rules! emit_event {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    cache.name = name,
                    cache.operation = operation,
                    cache.activity = activity,
                    cache.key = event.key,
                    circuit.state = event.circuit,
                    cache.duration = duration,
                    error = error,
                    "{activity}"
                )
            };
        }

        match event.activity.level() {
            Level::ERROR => emit_event!(Level::ERROR),
            Level::WARN => emit_event!(Level::WARN),
            Level::INFO => emit_event!(Level::INFO),
            _ => emit_event!(Level::DEBUG),
        }
    }
}
