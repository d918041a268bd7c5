//! Query-string sanitization middleware.
//!
//! Every query parameter value is passed through [`sanitize`] before routing,
//! so handlers reading `Query<T>` never see raw markup or script schemes.
//! The URI is only rewritten when at least one value changes.

use std::borrow::Cow;

use axum::Router;
use axum::extract::Request;
use axum::http::Uri;
use axum::http::uri::PathAndQuery;
use axum::middleware::{Next, from_fn};
use axum::response::{IntoResponse, Response};
use url::form_urlencoded;

use crate::handler::ErrorKind;
use crate::service::sanitize;
use crate::utility::tracing_targets::VALIDATION as TRACING_TARGET;

/// Extension trait for `axum::`[`Router`] to apply query sanitization.
pub trait RouterSanitizationExt<S> {
    /// Layers the query-string sanitizer.
    fn with_sanitization(self) -> Self;
}

impl<S> RouterSanitizationExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_sanitization(self) -> Self {
        self.layer(from_fn(sanitize_query))
    }
}

/// Sanitizes query parameter values in place.
pub async fn sanitize_query(mut request: Request, next: Next) -> Response {
    let Some(query) = request.uri().query() else {
        return next.run(request).await;
    };

    let Some(sanitized) = sanitized_query(query) else {
        return next.run(request).await;
    };

    match replace_query(request.uri(), &sanitized) {
        Some(uri) => {
            tracing::debug!(
                target: TRACING_TARGET,
                path = %uri.path(),
                "query string sanitized"
            );
            *request.uri_mut() = uri;
            next.run(request).await
        }
        None => {
            tracing::warn!(
                target: TRACING_TARGET,
                path = %request.uri().path(),
                "sanitized query string does not form a valid uri"
            );
            ErrorKind::BadRequest
                .with_message("Invalid query string")
                .into_response()
        }
    }
}

/// Returns the re-encoded query when sanitizing changed any value.
fn sanitized_query(query: &str) -> Option<String> {
    let mut changed = false;
    let pairs: Vec<(Cow<'_, str>, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| {
            let clean = sanitize(&value);
            changed |= clean != value;
            (key, clean)
        })
        .collect();

    if !changed {
        return None;
    }

    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    Some(encoded)
}

fn replace_query(uri: &Uri, query: &str) -> Option<Uri> {
    let path_and_query = if query.is_empty() {
        uri.path().to_owned()
    } else {
        format!("{}?{query}", uri.path())
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}
