// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_COUNT: u32 = 10;

/// The outcome of one guarded call, as the breaker counts it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failure,
}

/// Failure rate and throughput over the sampling window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct HealthInfo {
    throughput: u32,
    failure_rate: f64,
    unhealthy: bool,
}

impl HealthInfo {
    pub fn new(successes: u32, failures: u32, failure_threshold: f64, min_throughput: u32) -> Self {
        let throughput = successes.saturating_add(failures);

        if throughput == 0 {
            return Self {
                throughput: 0,
                failure_rate: 0.0,
                unhealthy: false,
            };
        }

        let failure_rate = f64::from(failures) / f64::from(throughput);

        Self {
            throughput,
            failure_rate,
            unhealthy: failure_rate >= failure_threshold && throughput >= min_throughput,
        }
    }

    pub fn throughput(&self) -> u32 {
        self.throughput
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    pub fn is_unhealthy(&self) -> bool {
        self.unhealthy
    }
}

/// Counts outcomes in ten buckets spanning the sampling duration.
#[derive(Debug)]
pub(crate) struct HealthMetrics {
    sampling_duration: Duration,
    window_duration: Duration,
    windows: VecDeque<Window>,
    failure_threshold: f64,
    min_throughput: u32,
}

impl HealthMetrics {
    pub fn new(sampling_duration: Duration, failure_threshold: f64, min_throughput: u32) -> Self {
        Self {
            sampling_duration,
            window_duration: sampling_duration / WINDOW_COUNT,
            windows: VecDeque::with_capacity(WINDOW_COUNT as usize),
            failure_threshold,
            min_throughput,
        }
    }

    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        self.discard_expired(now);

        if let Some(back) = self.windows.back_mut()
            && now.saturating_duration_since(back.started_at) < self.window_duration
        {
            back.update(outcome);
        } else {
            let mut window = Window::new(now);
            window.update(outcome);
            self.windows.push_back(window);
        }
    }

    pub fn health_info(&mut self, now: Instant) -> HealthInfo {
        self.discard_expired(now);

        let (successes, failures) = self.windows.iter().fold((0_u32, 0_u32), |(s, f), w| {
            (s.saturating_add(w.successes), f.saturating_add(w.failures))
        });

        HealthInfo::new(successes, failures, self.failure_threshold, self.min_throughput)
    }

    fn discard_expired(&mut self, now: Instant) {
        while let Some(front) = self.windows.front()
            && now.saturating_duration_since(front.started_at) > self.sampling_duration
        {
            self.windows.pop_front();
        }
    }
}

#[derive(Debug)]
struct Window {
    successes: u32,
    failures: u32,
    started_at: Instant,
}

impl Window {
    fn new(started_at: Instant) -> Self {
        Self {
            successes: 0,
            failures: 0,
            started_at,
        }
    }

    fn update(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes = self.successes.saturating_add(1),
            Outcome::Failure => self.failures = self.failures.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[expect(clippy::float_cmp, reason = "Test")]
    fn empty_metrics_are_healthy() {
        let mut metrics = HealthMetrics::new(Duration::from_secs(10), 0.5, 5);

        let info = metrics.health_info(Instant::now());

        assert_eq!(info.throughput(), 0);
        assert_eq!(info.failure_rate(), 0.0);
        assert!(!info.is_unhealthy());
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "Test")]
    fn failures_at_threshold_and_throughput_are_unhealthy() {
        let mut metrics = HealthMetrics::new(Duration::from_secs(10), 0.5, 2);
        let now = Instant::now();
        metrics.record(Outcome::Success, now);
        metrics.record(Outcome::Failure, now);

        let info = metrics.health_info(now);

        assert_eq!(info.throughput(), 2);
        assert_eq!(info.failure_rate(), 0.5);
        assert!(info.is_unhealthy());
    }

    #[test]
    fn old_windows_are_discarded() {
        let mut metrics = HealthMetrics::new(Duration::from_secs(10), 0.5, 1);
        let start = Instant::now();
        metrics.record(Outcome::Failure, start);

        let later = start + Duration::from_secs(11);
        metrics.record(Outcome::Success, later);
        let info = metrics.health_info(later);

        assert_eq!(info.throughput(), 1);
        assert!(!info.is_unhealthy());
    }

    #[test]
    fn outcomes_are_bucketed_per_window() {
        let mut metrics = HealthMetrics::new(Duration::from_secs(10), 0.5, 5);
        let start = Instant::now();
        for i in 0..30 {
            metrics.record(Outcome::Success, start + Duration::from_millis(i * 100));
        }

        assert_eq!(metrics.windows.len(), 3);
        assert_eq!(metrics.windows[0].successes, 10);

        let info = metrics.health_info(start + Duration::from_secs(12));

        assert_eq!(metrics.windows.len(), 1);
        assert_eq!(info.throughput(), 10);
    }

    #[test]
    fn threshold_and_throughput_boundaries() {
        assert!(HealthInfo::new(90, 10, 0.1, 100).is_unhealthy());
        assert!(!HealthInfo::new(91, 9, 0.1, 100).is_unhealthy());
        assert!(!HealthInfo::new(0, 99, 0.1, 100).is_unhealthy());
        assert_eq!(HealthInfo::new(u32::MAX, 1, 0.5, 5).throughput(), u32::MAX);
    }
}
