//! Recovery middleware for handling errors, panics, and timeouts.
//!
//! Requests that run past the configured timeout are aborted with 504, and a
//! panicking handler produces a JSON 500 instead of a dropped connection.

use std::any::Any;
use std::ops::RangeInclusive;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::response::{IntoResponse, Response};
#[cfg(any(test, feature = "config"))]
use clap::Args;
use serde::{Deserialize, Serialize};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::catch_panic::CatchPanicLayer;

use crate::handler::{Error as HttpError, ErrorKind};
use crate::utility::tracing_targets::{
    RECOVERY_ERROR as TRACING_TARGET_ERROR, RECOVERY_PANIC as TRACING_TARGET_PANIC,
};
use crate::{Error, Result};

type Panic = Box<dyn Any + Send + 'static>;

/// Configuration for recovery middleware behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "config"), derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct RecoveryConfig {
    /// Maximum duration in seconds to wait for a request to complete before timing out.
    /// Requests exceeding this duration receive a 504 response.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(long, env = "REQUEST_TIMEOUT", default_value_t = 30)
    )]
    pub request_timeout: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            request_timeout: 30,
        }
    }
}

impl RecoveryConfig {
    /// Accepted request timeouts in seconds.
    pub const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=300;

    /// Creates a new configuration with the specified request timeout in seconds.
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            request_timeout: secs,
        }
    }

    /// Returns the request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Validates the timeout bounds.
    pub fn validate(&self) -> Result<()> {
        if !Self::TIMEOUT_RANGE.contains(&self.request_timeout) {
            return Err(Error::config(format!(
                "request timeout must be between {} and {} seconds",
                Self::TIMEOUT_RANGE.start(),
                Self::TIMEOUT_RANGE.end(),
            )));
        }

        Ok(())
    }
}

/// Extension trait for `axum::`[`Router`] to apply recovery middleware.
pub trait RouterRecoveryExt<S> {
    /// Layers recovery middleware with the provided configuration.
    ///
    /// This middleware stack handles request timeouts, panics in handlers,
    /// and Tower service errors, converting them to JSON error responses.
    fn with_recovery(self, config: &RecoveryConfig) -> Self;

    /// Layers recovery middleware with default configuration.
    fn with_default_recovery(self) -> Self;
}

impl<S> RouterRecoveryExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_recovery(self, config: &RecoveryConfig) -> Self {
        let middlewares = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_error))
            .layer(CatchPanicLayer::custom(catch_panic))
            .layer(TimeoutLayer::new(config.request_timeout()));

        self.layer(middlewares)
    }

    fn with_default_recovery(self) -> Self {
        self.with_recovery(&RecoveryConfig::default())
    }
}

async fn handle_error(err: BoxError) -> Response {
    use tower::timeout::error::Elapsed;

    let error = if err.is::<Elapsed>() {
        tracing::warn!(
            target: TRACING_TARGET_ERROR,
            error = %err,
            "request timeout exceeded"
        );

        ErrorKind::RequestTimeout
            .with_context("the request took too long to process and was terminated")
    } else {
        tracing::error!(
            target: TRACING_TARGET_ERROR,
            error = %err,
            "unknown middleware error"
        );

        ErrorKind::InternalServerError
            .with_message("An unexpected error occurred")
            .with_context(err.to_string())
    };

    error.into_response()
}

fn catch_panic(err: Panic) -> Response {
    if let Some(error) = err.downcast_ref::<HttpError<'static>>() {
        tracing::error!(
            target: TRACING_TARGET_PANIC,
            error = %error,
            "service panic"
        );
        return error.clone().into_response();
    }

    let message = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic type");

    tracing::error!(
        target: TRACING_TARGET_PANIC,
        message = %message,
        "service panic"
    );

    ErrorKind::InternalServerError
        .with_message("An unexpected panic occurred")
        .into_response()
}
