//! HTTP server startup with graceful shutdown.
//!
//! The server binds with connect info so the default client address source
//! sees the peer address of every connection.

mod error;
mod http_server;
mod shutdown;

use axum::Router;
pub use error::{Result, ServerError};
use http_server::serve_with_shutdown;
use shutdown::shutdown_signal;

use crate::config::ServerConfig;

/// Serves `app` until SIGTERM or Ctrl+C, then drains in-flight requests.
///
/// # Errors
///
/// Returns an error if:
/// - Cannot bind to the specified address/port
/// - Server encounters a fatal error during operation
/// - In-flight requests outlive the shutdown timeout
pub async fn serve(app: Router, config: ServerConfig) -> Result<()> {
    serve_with_shutdown(app, &config, shutdown_signal()).await
}
