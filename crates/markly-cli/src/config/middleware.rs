//! Middleware configuration for the HTTP server.
//!
//! CORS and recovery settings are re-exported from `markly-server`; the body
//! ceiling and the client address source are specific to how the binary
//! composes the pipeline.
//!
//! # Example
//!
//! ```bash
//! markly --cors-origins "https://app.markly.dev" --request-timeout 60
//! ```

use anyhow::{Context, anyhow};
use clap::Args;
use markly_server::middleware::{
    ClientKeySource, CorsConfig, DEFAULT_MAX_BODY_SIZE, RecoveryConfig,
};
use serde::{Deserialize, Serialize};

use super::TRACING_TARGET_CONFIG;

/// Middleware configuration combining CORS, recovery, body limit and rate
/// limit key settings.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// CORS (Cross-Origin Resource Sharing) configuration.
    #[clap(flatten)]
    pub cors: CorsConfig,

    /// Recovery middleware configuration.
    ///
    /// Controls request timeout and panic recovery behavior.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,

    /// Maximum request body size in bytes.
    #[arg(long, env = "MAX_REQUEST_SIZE_BYTES", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_request_size: usize,

    /// Trusted source of the client address used for per-client rate limits.
    ///
    /// Only select a proxy header when every request passes through that proxy.
    #[arg(long, env = "CLIENT_IP_SOURCE", value_enum, default_value_t = ClientKeySource::ConnectInfo)]
    pub client_ip_source: ClientKeySource,
}

impl MiddlewareConfig {
    /// Validates CORS lists, the request timeout and the body ceiling.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.cors.validate().context("invalid CORS configuration")?;
        self.recovery
            .validate()
            .context("invalid recovery configuration")?;

        if self.max_request_size == 0 {
            return Err(anyhow!("Maximum request size must be at least 1 byte"));
        }

        Ok(())
    }

    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            origins = ?self.cors.allowed_origins,
            methods = ?self.cors.allowed_methods,
            credentials = self.cors.allow_credentials,
            "CORS configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            request_timeout_secs = self.recovery.request_timeout,
            max_request_size = self.max_request_size,
            client_ip_source = %self.client_ip_source,
            "request hardening configuration"
        );
    }
}
