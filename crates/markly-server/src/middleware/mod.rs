//! Middleware for `axum::Router` and HTTP request processing.
//!
//! The pipeline stages, outermost first:
//!
//! - Security headers and CORS ([`RouterSecurityExt::with_security`])
//! - Timeouts and panic recovery ([`RouterRecoveryExt::with_recovery`])
//! - Request body ceiling ([`RouterSecurityExt::with_body_limit`])
//! - Request ids and tracing ([`RouterObservabilityExt::with_observability`])
//! - Query sanitization ([`RouterSanitizationExt::with_sanitization`])
//! - Global rate limit ([`RouterRateLimitExt::with_global_rate_limit`])
//!
//! Per-group stages ([`rate_limit_by_client`], [`authenticate`] and
//! [`require_authentication`]) are attached as route layers by
//! [`routes`](crate::handler::routes).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use axum::Router;
//! use markly_server::middleware::{
//!     RouterObservabilityExt, RouterRecoveryExt, RouterSanitizationExt, RouterSecurityExt,
//! };
//!
//! let app = Router::new()
//!     .with_sanitization()
//!     .with_observability()
//!     .with_body_limit(10 * 1024 * 1024)
//!     .with_default_recovery()
//!     .with_default_security();
//! ```

mod auth;
mod observability;
mod rate_limiting;
mod recovery;
mod sanitization;
mod security;

pub use auth::{authenticate, extract_bearer_token, require_authentication};
pub use observability::{REQUEST_ID_HEADER, RouterObservabilityExt};
pub use rate_limiting::{
    ClientKeySource, RouterRateLimitExt, rate_limit_by_client, rate_limit_global,
};
pub use recovery::{RecoveryConfig, RouterRecoveryExt};
pub use sanitization::{RouterSanitizationExt, sanitize_query};
pub use security::{
    CorsConfig, DEFAULT_MAX_BODY_SIZE, FrameOptions, ReferrerPolicy, RouterSecurityExt,
    SecurityHeadersConfig,
};
