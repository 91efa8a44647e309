// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A logical key with the facade's prefix applied.
///
/// Built once per operation and reused for every downstream call, so the prefix is never applied
/// twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The namespaced key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct KeyPrefix(Arc<str>);

impl KeyPrefix {
    pub fn new(prefix: &str) -> Self {
        Self(Arc::from(prefix))
    }

    pub fn apply(&self, logical: &str) -> CacheKey {
        let mut key = String::with_capacity(self.0.len() + logical.len());
        key.push_str(&self.0);
        key.push_str(logical);
        CacheKey(key)
    }
}
