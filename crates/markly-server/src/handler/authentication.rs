//! Session introspection for authenticated callers.
//!
//! Login and registration live in the business layer and are mounted through
//! [`CustomRoutes::with_authentication_routes`].
//!
//! [`CustomRoutes::with_authentication_routes`]: crate::handler::CustomRoutes::with_authentication_routes

use axum::routing::get;
use axum::{Json, Router};

use super::response::Session;
use crate::extract::AuthState;
use crate::service::ServiceState;
use crate::utility::tracing_targets::AUTHENTICATION as TRACING_TARGET;

/// Returns the caller's identity and token lifetime.
#[tracing::instrument(skip_all, fields(user_id = auth_state.user_id))]
async fn current_session(auth_state: AuthState) -> Json<Session> {
    tracing::debug!(target: TRACING_TARGET, "session requested");
    Json(Session::from(&*auth_state))
}

/// Returns a [`Router`] with the protected session route.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/auth/session", get(current_session))
}
