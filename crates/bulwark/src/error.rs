// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bulwark_resilience::PolicyError;
use bulwark_stack::{FetchError, InvalidSettings, StackError};
use recoverable::{Recovery, RecoveryInfo};

use crate::CacheKey;

/// Why a [`CacheFacade`](crate::CacheFacade) operation failed.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The cache settings were rejected before any I/O.
    #[error("invalid cache settings: {0}")]
    Validation(#[from] InvalidSettings),

    /// The shared tier kept failing transiently or the circuit is open, and fallback is
    /// disabled.
    #[error("cache stack unavailable: {0}")]
    TransientInfra(PolicyError<StackError>),

    /// The backing source failed.
    #[error(transparent)]
    BackingSource(FetchError),

    /// The cache stack failed in a way that is not transient.
    #[error("cache stack failed: {0}")]
    Stack(StackError),

    /// The cache stack failed, no buffered value was available and fetching directly from the
    /// backing source failed too.
    #[error("no value for '{key}': direct fetch failed after the cache stack failed with: {primary}")]
    Fatal {
        /// The namespaced key.
        key: CacheKey,
        /// The error of the direct fetch.
        #[source]
        source: FetchError,
        /// The failure of the cache stack that triggered the fallback.
        primary: PolicyError<StackError>,
    },
}

impl Error {
    /// Maps a policy failure to the error reported when no fallback is attempted.
    pub(crate) fn from_policy(error: PolicyError<StackError>) -> Self {
        match error {
            PolicyError::Failed(StackError::Fetch(fetch)) => Self::BackingSource(fetch),
            PolicyError::Failed(StackError::InvalidSettings(invalid)) => Self::Validation(invalid),
            PolicyError::Failed(stack) => Self::Stack(stack),
            other => Self::TransientInfra(other),
        }
    }

    /// The backing source error, if the backing source is what failed.
    #[must_use]
    pub fn fetch_error(&self) -> Option<&FetchError> {
        match self {
            Self::BackingSource(fetch) | Self::Fatal { source: fetch, .. } => Some(fetch),
            _ => None,
        }
    }
}

impl Recovery for Error {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Validation(_) | Self::BackingSource(_) => RecoveryInfo::never(),
            Self::TransientInfra(policy) => policy.recovery(),
            Self::Stack(stack) => stack.recovery(),
            Self::Fatal { primary, .. } => primary.recovery(),
        }
    }
}
