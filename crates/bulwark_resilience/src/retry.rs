// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use recoverable::RecoveryInfo;

/// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`, saturating.
pub(crate) fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    base.saturating_mul(1_u32 << exponent)
}

/// The delay hint carried by the failure wins over the computed backoff.
pub(crate) fn retry_delay(recovery: &RecoveryInfo, base: Duration, retry: u32) -> Duration {
    recovery.get_delay().unwrap_or_else(|| backoff_delay(base, retry))
}
