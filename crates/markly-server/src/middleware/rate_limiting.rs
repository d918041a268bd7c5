//! Rate limiting middleware.
//!
//! The global limiter shares a single bucket across all traffic. Per-client
//! limiters key their buckets by the client address that `axum-client-ip`
//! resolves from the configured [`ClientKeySource`]. The default source is the
//! TCP peer address, which a client cannot forge; proxy headers are only
//! trusted when a deployment selects one explicitly.

use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::http::header::RETRY_AFTER;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum_client_ip::{ClientIp, ClientIpSource};
#[cfg(any(test, feature = "config"))]
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::handler::Error;
use crate::service::{RateLimitExceeded, RateLimitKey, RateLimiter};

/// Trusted source of the client address used as the per-client limiter key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display)]
#[cfg_attr(any(test, feature = "config"), derive(ValueEnum))]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ClientKeySource {
    /// Peer address of the TCP connection.
    ///
    /// Requires the server to be started with
    /// `into_make_service_with_connect_info::<SocketAddr>()`.
    #[default]
    ConnectInfo,
    /// `X-Real-IP`, as set by nginx.
    XRealIp,
    /// Rightmost `X-Forwarded-For` entry, as appended by the nearest proxy.
    RightmostXForwardedFor,
    /// `CF-Connecting-IP`, as set by Cloudflare.
    CfConnectingIp,
}

impl ClientKeySource {
    /// Returns the matching `axum-client-ip` source.
    pub fn into_client_ip_source(self) -> ClientIpSource {
        match self {
            Self::ConnectInfo => ClientIpSource::ConnectInfo,
            Self::XRealIp => ClientIpSource::XRealIp,
            Self::RightmostXForwardedFor => ClientIpSource::RightmostXForwardedFor,
            Self::CfConnectingIp => ClientIpSource::CfConnectingIp,
        }
    }
}

/// Extension trait for `axum::`[`Router`] to apply rate limiting middleware.
pub trait RouterRateLimitExt<S> {
    /// Layers the global limiter in front of every route.
    fn with_global_rate_limit(self, rate_limiter: RateLimiter) -> Self;

    /// Installs the client address source read by the per-client limiters.
    ///
    /// Must wrap every route that uses [`rate_limit_by_client`].
    fn with_client_ip_source(self, source: ClientKeySource) -> Self;
}

impl<S> RouterRateLimitExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_global_rate_limit(self, rate_limiter: RateLimiter) -> Self {
        self.layer(from_fn_with_state(rate_limiter, rate_limit_global))
    }

    fn with_client_ip_source(self, source: ClientKeySource) -> Self {
        self.layer(source.into_client_ip_source().into_extension())
    }
}

/// Rate limits all requests against the shared global bucket.
pub async fn rate_limit_global(
    State(rate_limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match rate_limiter.check(RateLimitKey::Global) {
        Ok(()) => next.run(request).await,
        Err(error) => too_many_requests(error),
    }
}

/// Rate limits requests by client address.
///
/// Apply to the GraphQL and authentication route groups, each with its own
/// [`RateLimiter`].
///
/// ```rust,ignore
/// use axum::middleware::from_fn_with_state;
/// use markly_server::middleware::rate_limit_by_client;
///
/// let layer = from_fn_with_state(state.rate_limiters.authentication.clone(), rate_limit_by_client);
/// ```
pub async fn rate_limit_by_client(
    ClientIp(ip_address): ClientIp,
    State(rate_limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match rate_limiter.check(RateLimitKey::from_ip(ip_address)) {
        Ok(()) => next.run(request).await,
        Err(error) => too_many_requests(error),
    }
}

fn too_many_requests(error: RateLimitExceeded) -> Response {
    let retry_after = error.retry_after_secs();
    let mut response = Error::from(error).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}
