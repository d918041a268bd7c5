use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::extract::{AuthState, UserId};
use crate::service::SessionKeys;
use crate::utility::tracing_targets::AUTHENTICATION as TRACING_TARGET;

/// Returns the token of a single `Authorization: Bearer <token>` header.
///
/// A missing header, more than one `Authorization` value, another scheme, or
/// anything but exactly two space-separated parts all yield `None`. The scheme
/// name is matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }

    let mut parts = value.to_str().ok()?.split(' ');
    let (scheme, token) = (parts.next()?, parts.next()?);
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }

    Some(token)
}

/// Verifies the bearer token, if any, and attaches the caller's identity.
///
/// Fail-open: a missing or invalid token never rejects the request, it only
/// leaves the request without an [`AuthState`]. On success both [`AuthState`]
/// and [`UserId`] are inserted into the request extensions.
///
/// ```rust,ignore
/// use axum::middleware::from_fn_with_state;
/// use markly_server::middleware::authenticate;
///
/// let router = router.route_layer(from_fn_with_state(state.clone(), authenticate));
/// ```
pub async fn authenticate(
    State(session_keys): State<SessionKeys>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(request.headers()) else {
        return next.run(request).await;
    };

    match session_keys.verify(token) {
        Ok(auth_claims) => {
            tracing::debug!(
                target: TRACING_TARGET,
                user_id = auth_claims.user_id,
                token_id = %auth_claims.token_id,
                "identity attached to request"
            );

            let user_id = UserId(auth_claims.user_id);
            let extensions = request.extensions_mut();
            extensions.insert(AuthState::from_verified_claims(auth_claims));
            extensions.insert(user_id);
        }
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET,
                reason = error.as_str(),
                path = %request.uri().path(),
                "invalid bearer token, continuing without identity"
            );
        }
    }

    next.run(request).await
}
