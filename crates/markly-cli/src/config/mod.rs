//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! ├── middleware: MiddlewareConfig  # CORS, timeouts, body limit, client address
//! ├── service: ServiceConfig        # Token secret, bcrypt cost, rate limits
//! └── log_format: LogFormat         # Text or JSON log lines
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! markly --jwt-secret "$(openssl rand -hex 32)" --port 8080
//!
//! # Or via environment variables
//! JWT_SECRET="..." PORT=8080 LOG_FORMAT=json markly
//! ```

mod middleware;
mod server;

use std::process;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use markly_server::service::ServiceConfig;
pub use middleware::MiddlewareConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Output format of log lines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Complete CLI configuration.
///
/// Combines all configuration groups for the markly server:
/// - [`ServerConfig`]: Network binding and shutdown
/// - [`MiddlewareConfig`]: CORS, recovery, body limit and client address source
/// - [`ServiceConfig`]: Token signing, password hashing and rate limits
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "markly")]
#[command(about = "Markly bookmarking API server")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP middleware configuration (CORS, timeouts, body limit).
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,

    /// Security service configuration (secrets, hashing, rate limits).
    #[clap(flatten)]
    pub service: ServiceConfig,

    /// Log line format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so its values act
    /// as environment defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    ///
    /// `RUST_LOG` overrides the default `info` level.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        match self.log_format {
            LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
                .init(),
        }
    }

    /// Logs build information at debug level.
    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "build information"
        );
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.middleware
            .validate()
            .context("invalid middleware configuration")?;
        self.service
            .validate()
            .context("invalid service configuration")?;
        Ok(())
    }

    /// Logs configuration at info level (no secrets).
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.middleware.log();

        let rate_limiting = &self.service.rate_limiting;
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            jwt_expiry_secs = self.service.jwt_expiry_secs,
            bcrypt_cost = self.service.bcrypt_cost,
            global_per_minute = rate_limiting.global_per_minute,
            graphql_per_minute = rate_limiting.graphql_per_minute,
            authentication_per_minute = rate_limiting.authentication_per_minute,
            max_clients = rate_limiting.max_clients,
            "security configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}
