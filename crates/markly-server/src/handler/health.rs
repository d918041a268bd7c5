//! Liveness check.

use axum::Router;
use axum::routing::get;

use crate::service::ServiceState;

/// Returns `OK` while the process is serving requests.
async fn health_status() -> &'static str {
    "OK"
}

/// Returns a [`Router`] with the public health route.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/health", get(health_status))
}
