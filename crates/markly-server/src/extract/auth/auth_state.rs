//! Authentication state extractor.
//!
//! The [`authenticate`] middleware verifies the bearer token once per request
//! and stores the resulting [`AuthState`] in the request extensions. This
//! extractor only reads it back, so extraction never touches the token again.
//!
//! ```rust,ignore
//! use markly_server::extract::AuthState;
//!
//! async fn protected_handler(auth_state: AuthState) -> String {
//!     format!("Hello, {}", auth_state.username)
//! }
//!
//! async fn optional_auth_handler(auth_state: Option<AuthState>) -> String {
//!     match auth_state {
//!         Some(auth) => format!("Hello, {}", auth.username),
//!         None => "Hello, anonymous".to_string(),
//!     }
//! }
//! ```
//!
//! [`authenticate`]: crate::middleware::authenticate

use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::Extensions;
use axum::http::request::Parts;
use derive_more::Deref;

use super::{AuthClaims, Identity};
use crate::handler::{Error, ErrorKind};
use crate::utility::tracing_targets::AUTHENTICATION as TRACING_TARGET;

/// Verified identity token claims of the current request.
#[derive(Debug, Clone, Deref, PartialEq, Eq)]
pub struct AuthState(pub AuthClaims);

impl AuthState {
    /// Creates a new [`AuthState`] from claims that passed signature and
    /// time-bound verification.
    #[inline]
    #[must_use]
    pub const fn from_verified_claims(auth_claims: AuthClaims) -> Self {
        Self(auth_claims)
    }

    /// Returns the authenticated identity.
    #[inline]
    pub fn identity(&self) -> Identity {
        self.0.identity()
    }
}

/// Returns the identity attached to a request, if any.
///
/// Never fails: a request without a verified token simply has no identity.
pub fn current_identity(extensions: &Extensions) -> Option<Identity> {
    extensions.get::<AuthState>().map(AuthState::identity)
}

impl<S> FromRequestParts<S> for AuthState
where
    S: Sync + Send,
{
    type Rejection = Error<'static>;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(auth_state) = parts.extensions.get::<Self>() {
            return Ok(auth_state.clone());
        }

        tracing::warn!(
            target: TRACING_TARGET,
            method = %parts.method,
            path = %parts.uri.path(),
            "unauthenticated request to a protected route"
        );

        Err(ErrorKind::Unauthorized
            .with_message("A valid bearer token is required")
            .with_context("no verified identity on the request"))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthState
where
    S: Sync + Send,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use jiff::{SignedDuration, Timestamp};

    use super::*;

    fn claims() -> AuthClaims {
        let now = Timestamp::now();
        let identity = Identity::new(7, "alice", "alice@example.com");
        AuthClaims::new(&identity, "ab".to_owned(), now, now + SignedDuration::from_hours(1))
    }

    #[tokio::test]
    async fn missing_state_is_unauthorized() -> anyhow::Result<()> {
        let (mut parts, ()) = Request::builder().uri("/auth/session").body(())?.into_parts();

        let rejection = <AuthState as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .err();
        assert_eq!(rejection.map(|e| e.kind()), Some(ErrorKind::Unauthorized));

        let optional =
            <AuthState as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(optional, Ok(None)));
        Ok(())
    }

    #[tokio::test]
    async fn attached_state_is_extracted() -> anyhow::Result<()> {
        let (mut parts, ()) = Request::builder().body(())?.into_parts();
        parts.extensions.insert(AuthState::from_verified_claims(claims()));

        let state = <AuthState as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .ok();
        assert_eq!(state.map(|s| s.user_id), Some(7));
        assert_eq!(
            current_identity(&parts.extensions),
            Some(Identity::new(7, "alice", "alice@example.com"))
        );
        Ok(())
    }

    #[test]
    fn lookup_without_identity_is_none() {
        assert_eq!(current_identity(&Extensions::new()), None);
    }
}
