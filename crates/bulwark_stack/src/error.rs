// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;

use recoverable::{Recovery, RecoveryInfo};

use crate::{FetchError, InvalidSettings};

/// A failure reported by a [`CacheStack`](crate::CacheStack).
///
/// Timeouts and connection failures against the shared tier are transient infrastructure
/// failures: they report [`RecoveryInfo::retry`] and are the only failures a resilience policy
/// retries or counts against the circuit. Every other variant reports [`RecoveryInfo::never`].
///
/// # Examples
///
/// ```
/// use bulwark_stack::StackError;
/// use recoverable::{Recovery, RecoveryKind};
///
/// let error = StackError::timeout("shared tier did not answer within 5s");
/// assert!(error.is_transient());
/// assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum StackError {
    /// The shared tier did not answer in time.
    #[error("shared tier timed out: {0}")]
    Timeout(Cow<'static, str>),

    /// The shared tier could not be reached.
    #[error("shared tier connection failed: {0}")]
    Connection(Cow<'static, str>),

    /// The backing-source fetch invoked by the stack failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A value could not be encoded for, or decoded from, the shared tier.
    #[error("cache payload codec failed: {0}")]
    Codec(Cow<'static, str>),

    /// The stack was given invalid settings.
    #[error(transparent)]
    InvalidSettings(#[from] InvalidSettings),

    /// A coalesced fetch for the key produced a value of a different type than requested.
    #[error("cached value for '{key}' has a different type than requested")]
    TypeMismatch {
        /// The namespaced key.
        key: String,
    },
}

impl StackError {
    /// Creates a [`StackError::Timeout`].
    pub fn timeout(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout(message.into())
    }

    /// Creates a [`StackError::Connection`].
    pub fn connection(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a [`StackError::Codec`].
    pub fn codec(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Codec(message.into())
    }

    /// Returns `true` for shared-tier timeouts and connection failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}

impl Recovery for StackError {
    fn recovery(&self) -> RecoveryInfo {
        if self.is_transient() {
            RecoveryInfo::retry()
        } else {
            RecoveryInfo::never()
        }
    }
}

impl From<serde_json::Error> for StackError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string().into())
    }
}
