// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.
//!
//! - [`LogCapture`] collects formatted `tracing` output so tests can assert on emitted events.
//! - [`MetricTester`] wires an in-memory OpenTelemetry exporter to a meter provider so tests can
//!   assert on recorded instruments and their attributes.

mod log;
mod metrics;

pub use log::*;
pub use metrics::*;
