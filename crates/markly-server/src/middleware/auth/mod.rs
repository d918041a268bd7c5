//! Authentication middleware.
//!
//! [`authenticate`] is fail-open: it attaches an identity when the request
//! carries a valid bearer token and lets the request through either way.
//! [`require_authentication`] is the fail-closed gate placed in front of
//! protected routes.

mod authenticate;
mod require_auth;

pub use authenticate::{authenticate, extract_bearer_token};
pub use require_auth::require_authentication;
