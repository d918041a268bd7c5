//! Observability middleware for request tracing.
//!
//! Every request gets a UUID `x-request-id` (kept when the client already
//! sent one), a tracing span, and the same id echoed on the response.
//! `Authorization` and `Cookie` are marked sensitive so the trace layer never
//! prints them.

use axum::Router;
use axum::http::header::{self, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Extension trait for `axum::`[`Router`] to apply observability middleware.
pub trait RouterObservabilityExt<S> {
    /// Layers observability middleware for request tracing and logging.
    ///
    /// This middleware stack generates unique request IDs, adds structured
    /// logging spans for each request, propagates request IDs to responses,
    /// and marks sensitive headers for redaction in logs.
    fn with_observability(self) -> Self;
}

impl<S> RouterObservabilityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_observability(self) -> Self {
        let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

        self.layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetSensitiveRequestHeadersLayer::new([
                header::AUTHORIZATION,
                header::COOKIE,
            ]))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }
}
