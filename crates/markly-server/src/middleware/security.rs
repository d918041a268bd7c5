//! Security middleware for HTTP request protection.
//!
//! Response security headers, CORS, response compression and the request
//! body ceiling. The header layers are the outermost stage of the pipeline, so
//! every response (including rejections produced further in) carries them.

use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::Method;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
#[cfg(any(test, feature = "config"))]
use clap::Args;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::handler::ErrorKind;
use crate::utility::tracing_targets::SECURITY as TRACING_TARGET;
use crate::{Error, Result};

/// Default maximum request body size: 10MB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Extension trait for `axum::`[`Router`] to apply security middleware.
pub trait RouterSecurityExt<S> {
    /// Layers CORS, response compression and the security headers.
    ///
    /// Header values that cannot be encoded are skipped with a warning.
    fn with_security(self, cors: &CorsConfig, headers: &SecurityHeadersConfig) -> Self;

    /// Layers security middlewares with default configurations.
    fn with_default_security(self) -> Self;

    /// Rejects request bodies larger than `max_size` bytes with 413.
    ///
    /// A declared `Content-Length` above the limit is rejected before the
    /// handler runs; streamed bodies are cut off once they cross it.
    fn with_body_limit(self, max_size: usize) -> Self;
}

impl<S> RouterSecurityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_security(self, cors: &CorsConfig, headers: &SecurityHeadersConfig) -> Self {
        let mut router = self
            .layer(CompressionLayer::new())
            .layer(cors.to_cors_layer());

        for (name, value) in headers.to_header_pairs() {
            router = router.layer(SetResponseHeaderLayer::overriding(name, value));
        }

        router
    }

    fn with_default_security(self) -> Self {
        self.with_security(&CorsConfig::default(), &SecurityHeadersConfig::default())
    }

    fn with_body_limit(self, max_size: usize) -> Self {
        self.layer(RequestBodyLimitLayer::new(max_size))
            .layer(DefaultBodyLimit::max(max_size))
            .layer(from_fn_with_state(max_size, reject_oversized_body))
    }
}

/// Rejects requests whose declared `Content-Length` exceeds the limit.
async fn reject_oversized_body(
    State(max_size): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    let content_length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(content_length) = content_length
        && content_length > max_size as u64
    {
        tracing::warn!(
            target: TRACING_TARGET,
            content_length,
            max_size,
            path = %request.uri().path(),
            "request body exceeds the size limit"
        );

        return ErrorKind::PayloadTooLarge
            .with_context(format!("maximum request body size is {max_size} bytes"))
            .into_response();
    }

    next.run(request).await
}

mod defaults {
    pub const ALLOWED_ORIGINS: &str = "http://localhost:3000";
    pub const ALLOWED_METHODS: &str = "GET,POST,OPTIONS";
    pub const ALLOWED_HEADERS: &str = "accept,authorization,content-type,x-requested-with";
    pub const EXPOSED_HEADERS: &str = "content-length";
    pub const MAX_AGE_SECONDS: u64 = 300;

    pub fn split(list: &str) -> Vec<String> {
        list.split(',').map(str::to_owned).collect()
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
///
/// Origins, methods and headers are explicit allow-lists. When credentials
/// are allowed none of them may be the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "config"), derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct CorsConfig {
    /// Allowed CORS origins.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-origins",
            env = "CORS_ORIGINS",
            value_delimiter = ',',
            default_value = defaults::ALLOWED_ORIGINS
        )
    )]
    pub allowed_origins: Vec<String>,

    /// Allowed request methods.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-methods",
            env = "CORS_METHODS",
            value_delimiter = ',',
            default_value = defaults::ALLOWED_METHODS
        )
    )]
    pub allowed_methods: Vec<String>,

    /// Allowed request headers.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-headers",
            env = "CORS_HEADERS",
            value_delimiter = ',',
            default_value = defaults::ALLOWED_HEADERS
        )
    )]
    pub allowed_headers: Vec<String>,

    /// Response headers readable by the browser.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-expose-headers",
            value_delimiter = ',',
            default_value = defaults::EXPOSED_HEADERS
        )
    )]
    pub exposed_headers: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-allow-credentials",
            default_value_t = true,
            action = clap::ArgAction::Set
        )
    )]
    pub allow_credentials: bool,

    /// Maximum age for CORS preflight requests in seconds.
    #[cfg_attr(
        any(test, feature = "config"),
        arg(
            long = "cors-max-age",
            env = "CORS_MAX_AGE",
            default_value_t = defaults::MAX_AGE_SECONDS
        )
    )]
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: defaults::split(defaults::ALLOWED_ORIGINS),
            allowed_methods: defaults::split(defaults::ALLOWED_METHODS),
            allowed_headers: defaults::split(defaults::ALLOWED_HEADERS),
            exposed_headers: defaults::split(defaults::EXPOSED_HEADERS),
            allow_credentials: true,
            max_age_seconds: defaults::MAX_AGE_SECONDS,
        }
    }
}

impl CorsConfig {
    /// Returns the CORS max age as a Duration.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// Validates the allow-lists.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_origins.is_empty() {
            return Err(Error::config("at least one CORS origin must be allowed"));
        }

        if self.allow_credentials {
            let lists = [
                ("origins", &self.allowed_origins),
                ("methods", &self.allowed_methods),
                ("headers", &self.allowed_headers),
            ];

            for (name, list) in lists {
                if list.iter().any(|entry| entry.trim() == "*") {
                    return Err(Error::config(format!(
                        "CORS {name} cannot contain '*' when credentials are allowed"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Builds the [`CorsLayer`], skipping entries that do not parse.
    pub fn to_cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = parse_entries("origin", &self.allowed_origins, |s| {
            HeaderValue::from_str(s).ok()
        });
        let methods: Vec<Method> = parse_entries("method", &self.allowed_methods, |s| {
            Method::from_bytes(s.to_ascii_uppercase().as_bytes()).ok()
        });
        let allowed_headers: Vec<HeaderName> =
            parse_entries("header", &self.allowed_headers, |s| {
                HeaderName::from_bytes(s.as_bytes()).ok()
            });
        let exposed_headers: Vec<HeaderName> =
            parse_entries("header", &self.exposed_headers, |s| {
                HeaderName::from_bytes(s.as_bytes()).ok()
            });

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
            .allow_credentials(self.allow_credentials)
            .max_age(self.max_age())
    }
}

fn parse_entries<T>(kind: &str, entries: &[String], parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = parse(entry);
            if parsed.is_none() {
                tracing::warn!(target: TRACING_TARGET, kind, entry, "ignoring invalid CORS entry");
            }
            parsed
        })
        .collect()
}

/// Security headers configuration for the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "config does nothing unless you use it"]
pub struct SecurityHeadersConfig {
    /// HSTS max age in seconds. Forces browsers to use HTTPS for this duration.
    pub hsts_max_age_seconds: u64,

    /// Whether to include subdomains in HSTS policy.
    pub hsts_include_subdomains: bool,

    /// Content Security Policy directives controlling resource loading.
    pub content_security_policy: String,

    /// X-Frame-Options value protecting against clickjacking.
    pub frame_options: FrameOptions,

    /// Referrer-Policy controlling referrer information in requests.
    pub referrer_policy: ReferrerPolicy,

    /// Permissions-Policy disabling high-risk browser features.
    pub permissions_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age_seconds: 31_536_000,
            hsts_include_subdomains: true,
            content_security_policy: "default-src 'self'; \
                 script-src 'self'; \
                 style-src 'self' 'unsafe-inline'; \
                 img-src 'self' data: https:; \
                 connect-src 'self'; \
                 object-src 'none'; \
                 frame-ancestors 'none'; \
                 base-uri 'self'; \
                 form-action 'self'"
                .to_owned(),
            frame_options: FrameOptions::Deny,
            referrer_policy: ReferrerPolicy::StrictOriginWhenCrossOrigin,
            permissions_policy: "geolocation=(), microphone=(), camera=()".to_owned(),
        }
    }
}

impl SecurityHeadersConfig {
    /// Returns the HSTS header value as a string.
    pub fn hsts_header_value(&self) -> String {
        if self.hsts_include_subdomains {
            format!("max-age={}; includeSubDomains", self.hsts_max_age_seconds)
        } else {
            format!("max-age={}", self.hsts_max_age_seconds)
        }
    }

    /// Returns every header set on responses.
    ///
    /// Configured values that are not valid header values are left out and
    /// logged.
    pub fn to_header_pairs(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut pairs = vec![
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static(self.frame_options.as_str()),
            ),
            (
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ),
            (
                header::REFERRER_POLICY,
                HeaderValue::from_static(self.referrer_policy.as_str()),
            ),
        ];

        let configured = [
            (header::STRICT_TRANSPORT_SECURITY, self.hsts_header_value()),
            (
                header::CONTENT_SECURITY_POLICY,
                self.content_security_policy.clone(),
            ),
            (
                HeaderName::from_static("permissions-policy"),
                self.permissions_policy.clone(),
            ),
        ];

        for (name, value) in configured {
            match HeaderValue::from_str(&value) {
                Ok(value) => pairs.push((name, value)),
                Err(_) => tracing::warn!(
                    target: TRACING_TARGET,
                    header = %name,
                    "skipping security header with an invalid value"
                ),
            }
        }

        pairs
    }
}

/// X-Frame-Options header values controlling frame embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameOptions {
    /// The page cannot be displayed in a frame, regardless of the site.
    Deny,
    /// The page can only be displayed in a frame on the same origin.
    SameOrigin,
}

impl FrameOptions {
    /// Returns the header value string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "DENY",
            Self::SameOrigin => "SAMEORIGIN",
        }
    }
}

/// Referrer-Policy header values controlling referrer information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    /// No referrer information is sent.
    NoReferrer,
    /// Sends only the origin as the referrer.
    Origin,
    /// Sends full URL for same-origin, only origin for cross-origin.
    StrictOriginWhenCrossOrigin,
}

impl ReferrerPolicy {
    /// Returns the header value string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoReferrer => "no-referrer",
            Self::Origin => "origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::{get, post};
    use axum_test::TestServer;
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        cors: CorsConfig,
    }

    #[test]
    fn parses_cors_lists() -> anyhow::Result<()> {
        let cli = TestCli::try_parse_from([
            "markly",
            "--cors-origins",
            "https://app.markly.dev,https://markly.dev",
            "--cors-allow-credentials",
            "false",
        ])?;

        assert_eq!(cli.cors.allowed_origins.len(), 2);
        assert_eq!(cli.cors.allowed_methods, ["GET", "POST", "OPTIONS"]);
        assert!(!cli.cors.allow_credentials);
        assert_eq!(cli.cors.max_age_seconds, 300);
        Ok(())
    }

    #[test]
    fn defaults_match_cli_defaults() -> anyhow::Result<()> {
        let cli = TestCli::try_parse_from(["markly"])?;
        assert_eq!(cli.cors, CorsConfig::default());
        assert!(cli.cors.validate().is_ok());
        Ok(())
    }

    #[test]
    fn wildcard_with_credentials_is_rejected() {
        let config = CorsConfig {
            allowed_headers: vec!["*".to_owned()],
            ..CorsConfig::default()
        };
        assert!(config.validate().is_err());

        let config = CorsConfig {
            allowed_origins: vec!["*".to_owned()],
            allow_credentials: false,
            ..CorsConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_header_values_are_skipped() {
        let config = SecurityHeadersConfig {
            content_security_policy: "default-src\n'self'".to_owned(),
            ..SecurityHeadersConfig::default()
        };

        let pairs = config.to_header_pairs();
        assert!(pairs.iter().all(|(name, _)| name != header::CONTENT_SECURITY_POLICY));
        assert!(pairs.iter().any(|(name, _)| name == header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn hsts_value() {
        let mut config = SecurityHeadersConfig::default();
        assert_eq!(config.hsts_header_value(), "max-age=31536000; includeSubDomains");
        config.hsts_include_subdomains = false;
        assert_eq!(config.hsts_header_value(), "max-age=31536000");
    }

    #[tokio::test]
    async fn responses_carry_security_headers() -> anyhow::Result<()> {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_default_security();
        let server = TestServer::new(router)?;

        let response = server.get("/missing").await;
        response.assert_status_not_found();
        assert_eq!(response.header("x-content-type-options"), "nosniff");
        assert_eq!(response.header("x-frame-options"), "DENY");
        assert_eq!(response.header("x-xss-protection"), "1; mode=block");
        assert!(response.header("content-security-policy").to_str()?.contains("object-src 'none'"));
        assert!(response.header("strict-transport-security").to_str()?.starts_with("max-age="));
        assert!(response.header("permissions-policy").to_str()?.contains("camera=()"));
        Ok(())
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() -> anyhow::Result<()> {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_default_security();
        let server = TestServer::new(router)?;

        let response = server
            .get("/")
            .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"))
            .await;
        assert_eq!(
            response.header("access-control-allow-origin"),
            "http://localhost:3000"
        );
        assert_eq!(response.header("access-control-allow-credentials"), "true");

        let response = server
            .get("/")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example"))
            .await;
        assert!(response.maybe_header("access-control-allow-origin").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() -> anyhow::Result<()> {
        use axum::body::Body;
        use tower::ServiceExt;

        let router = Router::new()
            .route("/", post(|body: String| async move { body.len().to_string() }))
            .with_body_limit(16);

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_LENGTH, 64)
            .body(Body::from("x".repeat(64)))?;
        let response = router.clone().oneshot(request).await?;
        assert_eq!(response.status(), axum::http::StatusCode::PAYLOAD_TOO_LARGE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["name"], "payload_too_large");

        let server = TestServer::new(router)?;
        server
            .post("/")
            .text("x".repeat(64))
            .await
            .assert_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE);
        server.post("/").text("small").await.assert_status_ok();
        Ok(())
    }
}
