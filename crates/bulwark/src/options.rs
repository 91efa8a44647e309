// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Formatter};
use std::time::Duration;

use bulwark_resilience::{InvalidOptions, ResilienceOptions};
use bulwark_stack::{CacheSettings, InvalidSettings};

/// Default lifetime of a cached value.
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(5 * 60);

/// Default number of entries the fallback buffer holds.
pub const DEFAULT_BUFFER_CAPACITY: u64 = 10_000;

/// Default port of the shared tier.
pub const DEFAULT_SHARED_TIER_PORT: u16 = 6380;

/// Behavior of a [`CacheFacade`](crate::CacheFacade).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use bulwark::CacheOptions;
///
/// let options = CacheOptions {
///     key_prefix: "weather:".to_string(),
///     stale_after_default: Some(Duration::from_secs(60)),
///     store_buffer_default: Some(Duration::from_secs(3600)),
///     ..CacheOptions::default()
/// };
///
/// assert!(options.validate().is_ok());
/// assert_eq!(options.default_settings().stale_after(), Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheOptions {
    /// Prepended to every logical key before any cache operation.
    pub key_prefix: String,

    /// Lifetime used by [`get_or_set_default`](crate::CacheFacade::get_or_set_default).
    #[cfg_attr(feature = "serde", serde(with = "bulwark_resilience::serde_duration"))]
    pub time_to_live_default: Duration,

    /// Age after which a value is refreshed in the background.
    #[cfg_attr(feature = "serde", serde(with = "bulwark_resilience::serde_duration::option"))]
    pub stale_after_default: Option<Duration>,

    /// Lifetime of fallback buffer entries. `None` disables the buffer.
    #[cfg_attr(feature = "serde", serde(with = "bulwark_resilience::serde_duration::option"))]
    pub store_buffer_default: Option<Duration>,

    /// Maximum number of entries in the fallback buffer.
    pub buffer_capacity: u64,

    /// Mirror every successful result into the buffer, not only values fetched during fallback.
    pub buffer_write_through: bool,

    /// Serve from the buffer or the backing source when the stack fails. When `false`, stack
    /// failures are returned to the caller.
    pub fallback: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            time_to_live_default: DEFAULT_TIME_TO_LIVE,
            stale_after_default: None,
            store_buffer_default: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            buffer_write_through: true,
            fallback: true,
        }
    }
}

impl CacheOptions {
    /// The settings built from the configured defaults.
    #[must_use]
    pub fn default_settings(&self) -> CacheSettings {
        CacheSettings::new(self.time_to_live_default).with_stale_after_opt(self.stale_after_default)
    }

    /// Checks the defaults and the buffer configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the default settings are invalid, the buffer lifetime is zero or
    /// the buffer has no capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_settings().validate()?;

        if self.store_buffer_default.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::ZeroBufferTimeToLive);
        }

        if self.store_buffer_default.is_some() && self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }

        Ok(())
    }
}

/// Connection parameters and resilience tuning for the shared tier.
///
/// The resilience fields are flattened so that a single configuration section describes both
/// where the shared tier lives and how calls into it are guarded.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SharedTierOptions {
    /// Host name of the shared tier.
    pub host: String,

    /// Port of the shared tier.
    pub port: u16,

    /// Access key. Ignored when `principal_id` is set.
    pub password: Option<String>,

    /// Managed identity used to authenticate instead of a password.
    pub principal_id: Option<String>,

    /// Connect over TLS.
    pub tls: bool,

    /// Fail instead of retrying in the background when the first connection attempt fails.
    pub abort_on_connect_fail: bool,

    /// Retry and circuit breaker tuning for calls into the shared tier.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub resilience: ResilienceOptions,
}

impl Default for SharedTierOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SHARED_TIER_PORT,
            password: None,
            principal_id: None,
            tls: true,
            abort_on_connect_fail: false,
            resilience: ResilienceOptions::default(),
        }
    }
}

impl SharedTierOptions {
    /// `host:port`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// How the connection authenticates.
    ///
    /// A principal id takes precedence over a password.
    #[must_use]
    pub fn credential(&self) -> Credential<'_> {
        match (self.principal_id.as_deref(), self.password.as_deref()) {
            (Some(principal_id), _) if !principal_id.is_empty() => Credential::ManagedIdentity { principal_id },
            (_, Some(password)) if !password.is_empty() => Credential::Password(password),
            _ => Credential::None,
        }
    }

    /// Checks that the shared tier can be reached and the resilience tuning is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the host is empty, no credential is configured or the
    /// resilience options are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }

        if matches!(self.credential(), Credential::None) {
            return Err(ConfigError::MissingCredential);
        }

        self.resilience.validate()?;
        Ok(())
    }
}

impl Debug for SharedTierOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTierOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("principal_id", &self.principal_id)
            .field("tls", &self.tls)
            .field("abort_on_connect_fail", &self.abort_on_connect_fail)
            .field("resilience", &self.resilience)
            .finish()
    }
}

/// The credential a [`SharedTierOptions`] resolves to.
#[derive(Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Credential<'a> {
    /// Authenticate as the given managed identity.
    ManagedIdentity {
        /// Principal id of the identity.
        principal_id: &'a str,
    },
    /// Authenticate with an access key.
    Password(&'a str),
    /// No credential is configured.
    None,
}

impl Debug for Credential<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManagedIdentity { principal_id } => f.debug_struct("ManagedIdentity").field("principal_id", principal_id).finish(),
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::None => f.write_str("None"),
        }
    }
}

/// Why a facade could not be configured.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The default cache settings are invalid.
    #[error("default cache settings are invalid: {0}")]
    Settings(#[from] InvalidSettings),

    /// The buffer lifetime is zero.
    #[error("buffer time to live must be greater than zero")]
    ZeroBufferTimeToLive,

    /// The buffer is enabled but can hold no entries.
    #[error("buffer capacity must be greater than zero")]
    ZeroBufferCapacity,

    /// The shared tier host is empty.
    #[error("shared tier host is not configured")]
    MissingHost,

    /// Neither a password nor a principal id is configured.
    #[error("shared tier credential is not configured, set a password or a principal id")]
    MissingCredential,

    /// The resilience tuning is invalid.
    #[error(transparent)]
    Resilience(#[from] InvalidOptions),
}
