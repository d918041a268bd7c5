//! HTTP request extractors.
//!
//! [`AuthState`] fails with 401 when the request carries no verified
//! identity; `Option<AuthState>` never fails.

pub mod auth;

pub use crate::extract::auth::{AuthClaims, AuthState, Identity, UserId, current_identity};
