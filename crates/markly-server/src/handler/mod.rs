//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use axum::Router;
//! use axum::routing::post;
//! use markly_server::handler::{CustomRoutes, routes};
//! use markly_server::service::{ServiceConfig, ServiceState};
//!
//! async fn graphql() -> &'static str {
//!     "{}"
//! }
//!
//! let config = ServiceConfig::builder()
//!     .with_jwt_secret("a-secret-that-is-at-least-32-bytes-long")
//!     .build()?;
//! let state = ServiceState::from_config(&config)?;
//!
//! let custom_routes = CustomRoutes::new()
//!     .with_graphql_routes(Router::new().route("/graphql", post(graphql)));
//!
//! let router = routes(custom_routes, state.clone()).with_state(state);
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod authentication;
mod error;
mod health;
mod response;
mod utils;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};

pub use crate::handler::error::{Error, ErrorKind, Result};
pub use crate::handler::response::{ErrorResponse, Session, ValidationErrorDetail};
pub use crate::handler::utils::CustomRoutes;
use crate::middleware::{authenticate, rate_limit_by_client, require_authentication};
use crate::service::{RateLimiter, ServiceState};

#[inline]
async fn handler() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Merges the built-in routes with `additional_routes`.
fn with_additional(
    router: Router<ServiceState>,
    additional_routes: Option<Router<ServiceState>>,
) -> Router<ServiceState> {
    match additional_routes {
        Some(additional) => router.merge(additional),
        None => router,
    }
}

/// Wraps `router` with `authenticate` and then the per-client `rate_limiter`,
/// so the limiter runs before the token is verified.
fn rate_limited(
    router: Router<ServiceState>,
    rate_limiter: RateLimiter,
    state: &ServiceState,
) -> Router<ServiceState> {
    router
        .route_layer(from_fn_with_state(state.clone(), authenticate))
        .route_layer(from_fn_with_state(rate_limiter, rate_limit_by_client))
}

/// Returns a [`Router`] with all route groups and the JSON 404 fallback.
///
/// Per-client limiters read the client address installed by
/// [`RouterRateLimitExt::with_client_ip_source`], which must wrap the
/// returned router.
///
/// [`RouterRateLimitExt::with_client_ip_source`]: crate::middleware::RouterRateLimitExt::with_client_ip_source
pub fn routes(routes: CustomRoutes, state: ServiceState) -> Router<ServiceState> {
    let authenticate = from_fn_with_state(state.clone(), authenticate);

    // The gate needs the identity, so `authenticate` wraps it.
    let private_router = with_additional(authentication::routes(), routes.private_routes)
        .route_layer(from_fn(require_authentication))
        .route_layer(authenticate.clone());

    let public_router =
        with_additional(health::routes(), routes.public_routes).route_layer(authenticate);

    let mut router = Router::new().merge(private_router).merge(public_router);

    if let Some(graphql_routes) = routes.graphql_routes {
        let limiter = state.rate_limiters.graphql.clone();
        router = router.merge(rate_limited(graphql_routes, limiter, &state));
    }

    if let Some(authentication_routes) = routes.authentication_routes {
        let limiter = state.rate_limiters.authentication.clone();
        router = router.merge(rate_limited(authentication_routes, limiter, &state));
    }

    router.fallback(handler)
}

#[cfg(test)]
mod test {
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum_test::TestServer;
    use jiff::SignedDuration;

    use super::*;
    use crate::extract::{AuthState, Identity};
    use crate::middleware::{
        ClientKeySource, RecoveryConfig, RouterObservabilityExt, RouterRateLimitExt,
        RouterRecoveryExt, RouterSanitizationExt, RouterSecurityExt,
    };
    use crate::service::{RateLimitingConfig, ServiceConfig};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    /// Returns a state whose authentication limiter allows two requests per minute.
    fn create_state() -> anyhow::Result<ServiceState> {
        let config = ServiceConfig::builder()
            .with_jwt_secret(SECRET)
            .with_bcrypt_cost(10u32)
            .with_rate_limiting(RateLimitingConfig {
                authentication_per_minute: 2,
                graphql_per_minute: 3,
                ..RateLimitingConfig::default()
            })
            .build()?;
        Ok(ServiceState::from_config(&config)?)
    }

    fn custom_routes() -> CustomRoutes {
        CustomRoutes::new()
            .with_authentication_routes(
                Router::new().route("/auth/login", post(|| async { "token" })),
            )
            .with_graphql_routes(Router::new().route(
                "/graphql",
                post(|auth_state: Option<AuthState>| async move {
                    match auth_state {
                        Some(auth_state) => auth_state.username.clone(),
                        None => "anonymous".to_owned(),
                    }
                }),
            ))
            .with_private_routes(
                Router::new().route("/bookmarks", get(|| async { "bookmarks" })),
            )
    }

    /// Returns a new [`TestServer`] with the whole pipeline.
    fn create_test_server(state: &ServiceState) -> anyhow::Result<TestServer> {
        let app = routes(custom_routes(), state.clone())
            .with_state(state.clone())
            .with_global_rate_limit(state.rate_limiters.global.clone())
            .with_sanitization()
            .with_client_ip_source(ClientKeySource::XRealIp)
            .with_observability()
            .with_body_limit(1024)
            .with_recovery(&RecoveryConfig::default())
            .with_default_security();

        Ok(TestServer::new(app)?)
    }

    fn token(state: &ServiceState) -> anyhow::Result<String> {
        let identity = Identity::new(7, "alice", "alice@example.com");
        Ok(state
            .session_keys
            .issue(&identity, SignedDuration::from_hours(1))?)
    }

    #[tokio::test]
    async fn health_is_public() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;

        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_text("OK");
        assert_eq!(response.header("x-frame-options"), "DENY");
        assert!(response.maybe_header("x-request-id").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn session_requires_token() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;

        let response = server.get("/auth/session").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.header("x-content-type-options"), "nosniff");

        let response = server
            .get("/bookmarks")
            .authorization_bearer("not-a-token")
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn session_echoes_identity() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;
        let token = token(&state)?;

        let response = server
            .get("/auth/session")
            .authorization_bearer(&token)
            .await;
        response.assert_status_ok();
        let session: Session = response.json();
        assert_eq!(session.identity, Identity::new(7, "alice", "alice@example.com"));

        server
            .get("/bookmarks")
            .authorization_bearer(&token)
            .await
            .assert_text("bookmarks");
        Ok(())
    }

    #[tokio::test]
    async fn authentication_routes_are_rate_limited() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;

        let login = |ip: &'static str| server.post("/auth/login").add_header("x-real-ip", ip);
        login("198.51.100.1").await.assert_status_ok();
        login("198.51.100.1").await.assert_status_ok();

        let response = login("198.51.100.1").await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.header("strict-transport-security"),
            "max-age=31536000; includeSubDomains"
        );

        login("198.51.100.2").await.assert_status_ok();
        Ok(())
    }

    #[tokio::test]
    async fn graphql_sees_optional_identity() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;
        let token = token(&state)?;

        let graphql = || server.post("/graphql").add_header("x-real-ip", "198.51.100.9");
        graphql().await.assert_text("anonymous");
        graphql().authorization_bearer(&token).await.assert_text("alice");
        graphql().await.assert_status_ok();
        graphql().await.assert_status(StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_path_is_json_not_found() -> anyhow::Result<()> {
        let state = create_state()?;
        let server = create_test_server(&state)?;

        let response = server.get("/nope").await;
        response.assert_status_not_found();
        let body: serde_json::Value = response.json();
        assert_eq!(body["name"], "not_found");
        assert!(response.maybe_header("content-security-policy").is_some());
        Ok(())
    }
}
