// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};

/// Why [`ResiliencePolicy::execute`](crate::ResiliencePolicy::execute) did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum PolicyError<E> {
    /// The circuit is open; the operation was not run.
    #[error("circuit is open, calls are rejected for another {retry_after:?}")]
    CircuitOpen {
        /// Time until the circuit lets a probe through.
        retry_after: Duration,
    },

    /// Every attempt failed with a transient error.
    #[error("operation failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: E,
    },

    /// The operation failed with an error that is not worth retrying.
    #[error(transparent)]
    Failed(E),
}

impl<E> PolicyError<E> {
    /// Returns `true` if the call was short-circuited by an open circuit.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// The error produced by the operation, if it ran.
    #[must_use]
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::Exhausted { source, .. } | Self::Failed(source) => Some(source),
        }
    }

    /// Consumes the error, returning the operation's error if it ran.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::Exhausted { source, .. } | Self::Failed(source) => Some(source),
        }
    }
}

impl<E: Recovery> Recovery for PolicyError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::CircuitOpen { retry_after } => RecoveryInfo::unavailable().delay(*retry_after),
            Self::Exhausted { .. } => RecoveryInfo::unavailable(),
            Self::Failed(error) => error.recovery(),
        }
    }
}
