//! Application state and dependency injection.

mod config;
mod security;
mod validation;

pub use crate::service::config::{ServiceConfig, ServiceConfigBuilder};
pub use crate::service::security::*;
pub use crate::service::validation::*;
// Re-export error types from crate root for convenience
pub use crate::{Error, Result};

use crate::utility::tracing_targets::SERVICE as TRACING_TARGET;

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection). Built once at
/// startup from an explicit [`ServiceConfig`] and shared read-only; the rate
/// limiter buckets are the only mutable state.
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub password_hasher: PasswordHasher,
    pub session_keys: SessionKeys,
    pub rate_limiters: RateLimiters,
}

impl ServiceState {
    /// Initializes application state from configuration.
    ///
    /// Fails when the token secret is shorter than [`MIN_SECRET_LEN`] bytes or
    /// a rate limit is zero.
    pub fn from_config(service_config: &ServiceConfig) -> Result<Self> {
        service_config.validate()?;

        let service_state = Self {
            password_hasher: service_config.password_hasher(),
            session_keys: service_config.load_session_keys()?,
            rate_limiters: service_config.rate_limiters()?,
        };

        tracing::info!(
            target: TRACING_TARGET,
            bcrypt_cost = service_state.password_hasher.cost(),
            "service state initialized"
        );

        Ok(service_state)
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(password_hasher: PasswordHasher);
impl_di!(session_keys: SessionKeys);
impl_di!(rate_limiters: RateLimiters);
