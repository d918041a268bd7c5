#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;

use anyhow::Context;
use axum::Router;
use markly_server::handler::{CustomRoutes, routes};
use markly_server::middleware::{
    RouterObservabilityExt, RouterRateLimitExt, RouterRecoveryExt, RouterSanitizationExt,
    RouterSecurityExt, SecurityHeadersConfig,
};
use markly_server::service::ServiceState;

use crate::config::{Cli, MiddlewareConfig};
use crate::server::ServerError;

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "markly_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "markly_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "markly_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    let server_error = error.downcast_ref::<ServerError>();
    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            error_code = server_error.map(ServerError::error_code),
            suggestion = server_error.and_then(ServerError::suggestion),
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    cli.init_tracing();
    cli.log();

    cli.validate()
        .map_err(|err| ServerError::invalid_config(&err))?;

    let state = ServiceState::from_config(&cli.service)
        .context("failed to create service state")?;
    let router = create_router(state, &cli.middleware);

    server::serve(router, cli.server).await?;

    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Security headers and CORS (outermost)
/// 2. Recovery, panics and timeouts
/// 3. Request body ceiling
/// 4. Request ids and tracing spans
/// 5. Client address extraction
/// 6. Query sanitization
/// 7. Global rate limit
/// 8. Routes (innermost) with per-group authentication and rate limits
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    let global_rate_limit = state.rate_limiters.global.clone();

    routes(CustomRoutes::new(), state.clone())
        .with_state(state)
        .with_global_rate_limit(global_rate_limit)
        .with_sanitization()
        .with_client_ip_source(middleware.client_ip_source)
        .with_observability()
        .with_body_limit(middleware.max_request_size)
        .with_recovery(&middleware.recovery)
        .with_security(&middleware.cors, &SecurityHeadersConfig::default())
}
