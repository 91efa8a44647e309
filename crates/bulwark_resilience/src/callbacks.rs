// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{OnClosedArgs, OnHalfOpenArgs, OnOpenedArgs, OnRetryArgs};

/// Defines a cloneable, type-erased callback wrapper with a `call` method.
macro_rules! define_callback {
    ($name:ident($args:ty)) => {
        #[derive(Clone)]
        pub(crate) struct $name(std::sync::Arc<dyn Fn($args) + Send + Sync>);

        impl $name {
            pub(crate) fn new<F>(callback: F) -> Self
            where
                F: Fn($args) + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(callback))
            }

            pub(crate) fn call(&self, args: $args) {
                (self.0)(args);
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish_non_exhaustive()
            }
        }
    };
}

define_callback!(OnRetry(OnRetryArgs));
define_callback!(OnOpened(OnOpenedArgs));
define_callback!(OnHalfOpen(OnHalfOpenArgs));
define_callback!(OnClosed(OnClosedArgs));

/// The lifecycle hooks configured on a policy.
#[derive(Debug, Clone, Default)]
pub(crate) struct Callbacks {
    pub on_retry: Option<OnRetry>,
    pub on_opened: Option<OnOpened>,
    pub on_half_open: Option<OnHalfOpen>,
    pub on_closed: Option<OnClosed>,
}
