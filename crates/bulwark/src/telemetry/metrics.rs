// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use super::{CACHE_ACTIVITY, CACHE_NAME, CACHE_OPERATION, CacheActivity, CacheOperation};

pub(crate) const EVENT_COUNT_NAME: &str = "bulwark.cache.event.count";
pub(crate) const OPERATION_DURATION_NAME: &str = "bulwark.cache.operation.duration";

#[derive(Debug, Clone)]
pub(crate) struct CacheMetrics {
    event_count: Counter<u64>,
    operation_duration: Histogram<f64>,
}

impl CacheMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            event_count: meter
                .u64_counter(EVENT_COUNT_NAME)
                .with_description("Cache facade events")
                .with_unit("{event}")
                .build(),
            operation_duration: meter
                .f64_histogram(OPERATION_DURATION_NAME)
                .with_description("Cache facade operation duration")
                .with_unit("s")
                .build(),
        }
    }

    pub fn record(&self, name: &str, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        let attributes = [
            KeyValue::new(CACHE_NAME, name.to_owned()),
            KeyValue::new(CACHE_OPERATION, operation.as_str()),
            KeyValue::new(CACHE_ACTIVITY, activity.as_str()),
        ];

        self.event_count.add(1, &attributes);

        if let Some(duration) = duration {
            self.operation_duration.record(duration.as_secs_f64(), &attributes);
        }
    }
}
