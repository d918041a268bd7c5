#[cfg(any(test, feature = "config"))]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::service::{
    MIN_SECRET_LEN, PasswordHasher, RateLimiters, RateLimitingConfig, SessionKeys,
    SessionKeysConfig,
};
use crate::utility::tracing_targets::SERVICE as TRACING_TARGET;
use crate::{Error, Result};

/// Default values for configuration options.
mod defaults {
    /// Default token lifetime: one day.
    pub const JWT_EXPIRY_SECS: u64 = 86_400;

    /// Default bcrypt work factor.
    pub const BCRYPT_COST: u32 = 12;
}

/// App [`state`] configuration.
///
/// [`state`]: crate::service::ServiceState
#[derive(Clone, Serialize, Deserialize, Builder)]
#[cfg_attr(any(test, feature = "config"), derive(Args))]
#[must_use = "config does nothing unless you use it"]
#[builder(
    pattern = "owned",
    setter(into, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct ServiceConfig {
    /// Shared HMAC secret used to sign identity tokens (at least 32 bytes).
    #[cfg_attr(any(test, feature = "config"), arg(long, env = "JWT_SECRET"))]
    pub jwt_secret: String,

    /// Default identity token lifetime in seconds.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long, env = "JWT_EXPIRY_SECS", default_value_t = defaults::JWT_EXPIRY_SECS)
    )]
    #[builder(default = "defaults::JWT_EXPIRY_SECS")]
    pub jwt_expiry_secs: u64,

    /// bcrypt work factor, clamped into 10..=15.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long, env = "BCRYPT_COST", default_value_t = defaults::BCRYPT_COST)
    )]
    #[builder(default = "defaults::BCRYPT_COST")]
    pub bcrypt_cost: u32,

    /// Rate limits per traffic class.
    #[cfg_attr(any(test, feature = "config"), command(flatten))]
    #[builder(default)]
    pub rate_limiting: RateLimitingConfig,
}

impl ServiceConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Returns the token secret and lifetime configuration.
    pub fn session_keys_config(&self) -> SessionKeysConfig {
        SessionKeysConfig {
            jwt_secret: self.jwt_secret.clone(),
            jwt_expiry_secs: self.jwt_expiry_secs,
        }
    }

    /// Loads the token keys.
    pub fn load_session_keys(&self) -> Result<SessionKeys> {
        SessionKeys::from_config(&self.session_keys_config())
    }

    /// Creates the password hasher with the configured (clamped) cost.
    pub fn password_hasher(&self) -> PasswordHasher {
        let hasher = PasswordHasher::new(self.bcrypt_cost);
        if hasher.cost() != self.bcrypt_cost {
            tracing::warn!(
                target: TRACING_TARGET,
                requested = self.bcrypt_cost,
                effective = hasher.cost(),
                "bcrypt cost clamped into the supported range"
            );
        }
        hasher
    }

    /// Creates the rate limiters.
    pub fn rate_limiters(&self) -> Result<RateLimiters> {
        RateLimiters::from_config(&self.rate_limiting)
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(Error::auth(format!(
                "JWT secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        if self.jwt_expiry_secs == 0 {
            return Err(Error::config("JWT expiry must be at least 1 second"));
        }

        self.rate_limiting.validate()
    }
}

impl ServiceConfigBuilder {
    /// Wrapper for builder validation that returns String errors.
    fn validate(builder: &ServiceConfigBuilder) -> Result<(), String> {
        if let Some(secret) = &builder.jwt_secret
            && secret.len() < MIN_SECRET_LEN
        {
            return Err(format!("JWT secret must be at least {MIN_SECRET_LEN} bytes"));
        }

        if let Some(expiry) = &builder.jwt_expiry_secs
            && *expiry == 0
        {
            return Err("JWT expiry must be at least 1 second".to_string());
        }

        if let Some(rate_limiting) = &builder.rate_limiting {
            rate_limiting.validate().map_err(|e| e.message().to_owned())?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiry_secs", &self.jwt_expiry_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("rate_limiting", &self.rate_limiting)
            .finish()
    }
}
