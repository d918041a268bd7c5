use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::extract::AuthState;

/// Requires a verified identity to proceed with the request.
///
/// Responds 401 when [`authenticate`] attached no [`AuthState`]; otherwise
/// the request passes through unchanged.
///
/// ```rust,ignore
/// use axum::middleware::from_fn;
/// use markly_server::middleware::require_authentication;
///
/// let protected = router.route_layer(from_fn(require_authentication));
/// ```
///
/// [`authenticate`]: crate::middleware::authenticate
pub async fn require_authentication(
    AuthState(_): AuthState,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}
