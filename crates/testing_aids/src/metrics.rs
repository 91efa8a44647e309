// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics, SumDataPoint};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};

/// Test helper for collecting and asserting on `OTel` metrics.
#[derive(Debug)]
pub struct MetricTester {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl Default for MetricTester {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricTester {
    #[must_use]
    pub fn new() -> Self {
        let in_memory = InMemoryMetricExporter::default();

        Self {
            exporter: in_memory.clone(),
            provider: SdkMeterProvider::builder().with_periodic_exporter(in_memory).build(),
        }
    }

    #[must_use]
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Flushes the provider and returns the names of every exported instrument.
    #[must_use]
    pub fn collect_names(&self) -> Vec<String> {
        self.with_latest(|metrics| metrics.iter().map(|metric| metric.name().to_string()).collect())
    }

    /// Flushes the provider and returns the attributes of every exported data point.
    #[must_use]
    pub fn collect_attributes(&self) -> Vec<KeyValue> {
        self.with_latest(|metrics| metrics.iter().copied().flat_map(collect_attributes_for_metric).collect())
    }

    /// Sums the `u64` counter data points named `name` that carry every attribute in `filter`.
    #[must_use]
    pub fn counter_total(&self, name: &str, filter: &[KeyValue]) -> u64 {
        self.with_latest(|metrics| {
            metrics
                .iter()
                .filter(|metric| metric.name() == name)
                .map(|metric| match metric.data() {
                    AggregatedMetrics::U64(MetricData::Sum(sum)) => sum
                        .data_points()
                        .filter(|point| filter.iter().all(|kv| point.attributes().any(|attr| attr == kv)))
                        .map(SumDataPoint::value)
                        .sum(),
                    _ => 0,
                })
                .sum()
        })
    }

    /// Asserts that every attribute in `key_values` was exported at least once.
    ///
    /// # Panics
    ///
    /// Panics if an attribute is missing.
    pub fn assert_attributes_contain(&self, key_values: &[KeyValue]) {
        let attributes = self.collect_attributes();

        for attr in key_values {
            assert!(
                attributes.contains(attr),
                "attribute {attr:?} not found in collected attributes: {attributes:?}"
            );
        }
    }

    /// Flushes the provider and hands the most recent export to `f`.
    ///
    /// Temporality is cumulative, so the latest export holds the running totals.
    fn with_latest<R>(&self, f: impl FnOnce(&[&Metric]) -> R) -> R {
        if let Err(error) = self.provider.force_flush() {
            panic!("failed to flush meter provider: {error}");
        }

        let finished = match self.exporter.get_finished_metrics() {
            Ok(finished) => finished,
            Err(error) => panic!("failed to read exported metrics: {error}"),
        };

        let metrics: Vec<&Metric> = finished
            .last()
            .into_iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .collect();

        f(&metrics)
    }
}

fn collect_attributes_for_metric(metric: &Metric) -> Vec<KeyValue> {
    match metric.data() {
        AggregatedMetrics::F64(data) => match data {
            MetricData::Gauge(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Sum(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Histogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::ExponentialHistogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        },
        AggregatedMetrics::U64(data) => match data {
            MetricData::Gauge(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Sum(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Histogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::ExponentialHistogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        },
        AggregatedMetrics::I64(data) => match data {
            MetricData::Gauge(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Sum(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::Histogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
            MetricData::ExponentialHistogram(data) => data.data_points().flat_map(|v| v.attributes().cloned()).collect(),
        },
    }
}
