// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tracing events emitted by the policy.

use std::fmt::Display;
use std::time::Duration;

use crate::health::HealthInfo;

pub(crate) const RETRY_EVENT: &str = "bulwark.retry";
pub(crate) const OPENED_EVENT: &str = "bulwark.circuit.opened";
pub(crate) const HALF_OPEN_EVENT: &str = "bulwark.circuit.half_open";
pub(crate) const CLOSED_EVENT: &str = "bulwark.circuit.closed";
pub(crate) const REJECTED_EVENT: &str = "bulwark.circuit.rejected";

pub(crate) fn retry(policy: &str, attempt: u32, delay: Duration, error: &dyn Display) {
    tracing::event!(
        name: RETRY_EVENT,
        tracing::Level::WARN,
        policy.name = policy,
        resilience.attempt = attempt,
        resilience.retry.delay = delay.as_secs_f32(),
        error = %error,
        "retry attempt {attempt}",
    );
}

pub(crate) fn opened(policy: &str, health: &HealthInfo, break_duration: Duration) {
    tracing::event!(
        name: OPENED_EVENT,
        tracing::Level::WARN,
        policy.name = policy,
        circuit.state = "open",
        circuit.failure_rate = health.failure_rate(),
        circuit.throughput = health.throughput(),
        circuit.break_duration = break_duration.as_secs_f32(),
        "circuit broken",
    );
}

pub(crate) fn reopened(policy: &str, break_duration: Duration) {
    tracing::event!(
        name: OPENED_EVENT,
        tracing::Level::WARN,
        policy.name = policy,
        circuit.state = "open",
        circuit.reopened = true,
        circuit.break_duration = break_duration.as_secs_f32(),
        "circuit broken, probe failed",
    );
}

pub(crate) fn half_open(policy: &str, open_duration: Duration) {
    tracing::event!(
        name: HALF_OPEN_EVENT,
        tracing::Level::INFO,
        policy.name = policy,
        circuit.state = "half_open",
        circuit.open_duration = open_duration.as_secs_f32(),
        "circuit is half-open",
    );
}

pub(crate) fn closed(policy: &str, open_duration: Duration) {
    tracing::event!(
        name: CLOSED_EVENT,
        tracing::Level::INFO,
        policy.name = policy,
        circuit.state = "closed",
        circuit.open_duration = open_duration.as_secs_f32(),
        "circuit reset",
    );
}

pub(crate) fn rejected(policy: &str, retry_after: Duration) {
    tracing::event!(
        name: REJECTED_EVENT,
        tracing::Level::WARN,
        policy.name = policy,
        circuit.state = "open",
        circuit.retry_after = retry_after.as_secs_f32(),
        "call rejected by open circuit",
    );
}
