//! HTTP error handling with builder pattern for dynamic error responses.

use std::borrow::Cow;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::handler::response::{ErrorResponse, ValidationErrorDetail};

/// The error type for HTTP handlers in the server.
///
/// Every rejection produced by the pipeline (401, 413, 429, timeouts) is
/// rendered through this type, so all of them share one JSON body shape.
#[derive(Clone)]
#[must_use = "errors do nothing unless serialized"]
pub struct Error<'a> {
    kind: ErrorKind,
    context: Option<Cow<'a, str>>,
    message: Option<Cow<'a, str>>,
    resource: Option<Cow<'a, str>>,
    suggestion: Option<Cow<'a, str>>,
    validation: Option<Vec<ValidationErrorDetail>>,
}

impl Error<'static> {
    /// Creates a new [`Error`] with the specified kind.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            message: None,
            resource: None,
            suggestion: None,
            validation: None,
        }
    }
}

impl<'a> Error<'a> {
    /// Attaches context information to the error.
    ///
    /// Context is logged but never sent to the client.
    #[inline]
    pub fn with_context(self, context: impl Into<Cow<'a, str>>) -> Self {
        Self {
            context: Some(context.into()),
            ..self
        }
    }

    /// Sets a custom user-friendly message for the error.
    #[inline]
    pub fn with_message(self, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Sets the resource that caused the error.
    #[inline]
    pub fn with_resource(self, resource: impl Into<Cow<'a, str>>) -> Self {
        Self {
            resource: Some(resource.into()),
            ..self
        }
    }

    /// Sets a suggestion for resolving the error.
    #[inline]
    pub fn with_suggestion(self, suggestion: impl Into<Cow<'a, str>>) -> Self {
        Self {
            suggestion: Some(suggestion.into()),
            ..self
        }
    }

    /// Attaches field-level validation details.
    #[inline]
    pub fn with_validation(self, details: Vec<ValidationErrorDetail>) -> Self {
        Self {
            validation: Some(details),
            ..self
        }
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context if present.
    #[inline]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the custom message if present.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the resource if present.
    #[inline]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Returns the validation details if present.
    #[inline]
    pub fn validation(&self) -> Option<&[ValidationErrorDetail]> {
        self.validation.as_deref()
    }

    /// Converts this error into a static version by cloning all borrowed data.
    pub fn into_static(self) -> Error<'static> {
        Error {
            kind: self.kind,
            context: self.context.map(|c| Cow::Owned(c.into_owned())),
            message: self.message.map(|m| Cow::Owned(m.into_owned())),
            resource: self.resource.map(|r| Cow::Owned(r.into_owned())),
            suggestion: self.suggestion.map(|s| Cow::Owned(s.into_owned())),
            validation: self.validation,
        }
    }
}

impl Default for Error<'static> {
    #[inline]
    fn default() -> Self {
        Self::new(ErrorKind::default())
    }
}

impl fmt::Debug for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();

        let mut debug_struct = f.debug_struct("Error");
        debug_struct
            .field("kind", &self.kind)
            .field("name", &response.name)
            .field("status", &response.status);

        if let Some(ref context) = self.context {
            debug_struct.field("context", context);
        }

        if let Some(ref message) = self.message {
            debug_struct.field("custom_message", message);
        }

        if let Some(ref resource) = self.resource {
            debug_struct.field("custom_resource", resource);
        }

        if let Some(ref validation) = self.validation {
            debug_struct.field("validation", validation);
        }

        debug_struct.finish()
    }
}

impl fmt::Display for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.kind.response();
        let message = self.message.as_deref().unwrap_or(&response.message);

        write!(f, "{} ({}): {}", response.name, response.status, message)?;

        if let Some(ref context) = self.context {
            write!(f, " - {}", context)?;
        }

        if let Some(ref resource) = self.resource {
            write!(f, " [resource: {}]", resource)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error<'_> {}

impl IntoResponse for Error<'_> {
    fn into_response(self) -> Response {
        let mut response = self.kind.response();

        if let Some(message) = self.message {
            response = response.with_message(message);
        }

        if let Some(resource) = self.resource {
            response = response.with_resource(resource);
        }

        if let Some(context) = self.context {
            response = response.with_context(context);
        }

        if let Some(suggestion) = self.suggestion {
            response = response.with_suggestion(suggestion);
        }

        if let Some(validation) = self.validation {
            response = response.with_validation_errors(validation);
        }

        response.into_response()
    }
}

impl From<ErrorKind> for Error<'static> {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// A specialized [`Result`] type for HTTP operations.
///
/// [`Result`]: std::result::Result
pub type Result<T, E = Error<'static>> = std::result::Result<T, E>;

/// Enumeration of all HTTP error kinds the pipeline produces.
#[must_use = "error kinds do nothing unless used to create errors"]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // 4xx Client Errors
    /// 400 Bad Request - Invalid request data
    BadRequest,
    /// 400 Bad Request - A field failed validation
    ValidationError,
    /// 401 Unauthorized - No verified identity on a protected route
    Unauthorized,
    /// 404 Not Found - Resource not found
    NotFound,
    /// 413 Payload Too Large - Body exceeds the configured ceiling
    PayloadTooLarge,
    /// 429 Too Many Requests - Rate limit exceeded
    TooManyRequests,

    // 5xx Server Errors
    /// 500 Internal Server Error - Unexpected server error
    #[default]
    InternalServerError,
    /// 504 Gateway Timeout - Request processing exceeded the timeout
    RequestTimeout,
}

impl ErrorKind {
    /// Converts this error kind into a full [`Error`].
    #[inline]
    pub fn into_error(self) -> Error<'static> {
        Error::new(self)
    }

    /// Creates an [`Error`] with the specified context.
    #[inline]
    pub fn with_context<'a>(self, context: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_context(context)
    }

    /// Creates an [`Error`] with the specified message.
    #[inline]
    pub fn with_message<'a>(self, message: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_message(message)
    }

    /// Creates an [`Error`] with the specified resource.
    #[inline]
    pub fn with_resource<'a>(self, resource: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_resource(resource)
    }

    /// Returns the HTTP status code for this error kind.
    #[inline]
    pub fn status_code(self) -> StatusCode {
        self.response().status
    }

    /// Returns the internal representation of this error kind.
    #[inline]
    pub fn response(self) -> ErrorResponse<'static> {
        match self {
            Self::BadRequest => ErrorResponse::BAD_REQUEST,
            Self::ValidationError => ErrorResponse::VALIDATION_ERROR,
            Self::Unauthorized => ErrorResponse::UNAUTHORIZED,
            Self::NotFound => ErrorResponse::NOT_FOUND,
            Self::PayloadTooLarge => ErrorResponse::PAYLOAD_TOO_LARGE,
            Self::TooManyRequests => ErrorResponse::TOO_MANY_REQUESTS,
            Self::InternalServerError => ErrorResponse::INTERNAL_SERVER_ERROR,
            Self::RequestTimeout => ErrorResponse::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.response().name.as_ref())
    }
}

impl IntoResponse for ErrorKind {
    #[inline]
    fn into_response(self) -> Response {
        self.response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_error() {
        let error = Error::default();
        assert_eq!(error.kind(), ErrorKind::InternalServerError);
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_builder_chaining() {
        let error = ErrorKind::NotFound
            .with_message("Bookmark not found")
            .with_resource("bookmark")
            .with_context("ID: 123");

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.message(), Some("Bookmark not found"));
        assert_eq!(error.resource(), Some("bookmark"));
        assert_eq!(error.context(), Some("ID: 123"));
    }

    #[test]
    fn std_fmt_display() {
        let error = ErrorKind::TooManyRequests
            .with_message("Slow down")
            .with_context("client:10.0.0.1");

        let display = format!("{}", error);
        assert!(display.contains("too_many_requests"));
        assert!(display.contains("429"));
        assert!(display.contains("Slow down"));
        assert!(display.contains("client:10.0.0.1"));
    }

    #[test]
    fn error_into_static() {
        let error = ErrorKind::ValidationError
            .with_message("Test message".to_string())
            .with_resource("test_resource".to_string())
            .with_context("Test context".to_string());

        let static_error = error.into_static();
        assert_eq!(static_error.message(), Some("Test message"));
        assert_eq!(static_error.resource(), Some("test_resource"));
        assert_eq!(static_error.context(), Some("Test context"));
    }

    #[test]
    fn error_kind_statuses() {
        let expected = [
            (ErrorKind::BadRequest, 400),
            (ErrorKind::ValidationError, 400),
            (ErrorKind::Unauthorized, 401),
            (ErrorKind::NotFound, 404),
            (ErrorKind::PayloadTooLarge, 413),
            (ErrorKind::TooManyRequests, 429),
            (ErrorKind::InternalServerError, 500),
            (ErrorKind::RequestTimeout, 504),
        ];

        for (kind, status) in expected {
            assert_eq!(kind.status_code().as_u16(), status, "{kind}");
            assert!(!kind.response().name.is_empty());
            assert_eq!(kind.into_response().status().as_u16(), status);
        }
    }
}
