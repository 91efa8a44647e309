// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Serde helpers that write [`Duration`]s in the friendly `jiff` format (`"15m"`, `"2s"`).
//!
//! Deserialization accepts the friendly format and ISO 8601 (`"PT15M"`). Use with
//! `#[serde(with = "bulwark_resilience::serde_duration")]`, or the [`option`] module for
//! `Option<Duration>` fields.

use std::time::Duration;

use jiff::SignedDuration;
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

/// Serializes `duration` as a friendly duration string.
///
/// # Errors
///
/// Fails if `duration` is too large to be represented.
pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    let signed = SignedDuration::try_from(*duration).map_err(S::Error::custom)?;
    serializer.collect_str(&format_args!("{signed:#}"))
}

/// Deserializes a duration from a friendly or ISO 8601 string.
///
/// # Errors
///
/// Fails if the input is not a duration string or is negative.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse(&text).map_err(D::Error::custom)
}

fn parse(text: &str) -> Result<Duration, String> {
    let signed: SignedDuration = text.parse().map_err(|error| format!("invalid duration '{text}': {error}"))?;
    Duration::try_from(signed).map_err(|error| format!("invalid duration '{text}': {error}"))
}

/// The same format for `Option<Duration>`; `None` is written as `null`.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes an optional duration.
    ///
    /// # Errors
    ///
    /// Fails if the duration is too large to be represented.
    #[expect(clippy::ref_option, reason = "signature required by serde(with)")]
    pub fn serialize<S: Serializer>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => super::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional duration.
    ///
    /// # Errors
    ///
    /// Fails if the input is neither `null` nor a valid duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| super::parse(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super")]
        delay: Duration,
        #[serde(with = "super::option", default)]
        stale: Option<Duration>,
    }

    #[test]
    fn writes_friendly_format() {
        let sample = Sample {
            delay: Duration::from_secs(15 * 60),
            stale: None,
        };

        let json = serde_json::to_string(&sample).unwrap();

        assert_eq!(json, r#"{"delay":"15m","stale":null}"#);
    }

    #[test]
    fn reads_friendly_and_iso_formats() {
        let sample: Sample = serde_json::from_str(r#"{"delay":"2s","stale":"PT1H"}"#).unwrap();

        assert_eq!(sample.delay, Duration::from_secs(2));
        assert_eq!(sample.stale, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(serde_json::from_str::<Sample>(r#"{"delay":"-5s"}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"delay":"soon"}"#).is_err());
    }
}
