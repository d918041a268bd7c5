use std::borrow::Cow;
use std::collections::HashMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use validator::ValidationErrors;

use crate::service::ValidationError;
use crate::utility::tracing_targets::SECURITY as TRACING_TARGET;

/// Validation error details for field-specific errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrorDetail {
    /// Field name that failed validation
    pub field: String,
    /// Error code for the validation failure
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional parameters related to the validation error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<HashMap<String, serde_json::Value>>,
}

impl From<&ValidationError> for ValidationErrorDetail {
    fn from(error: &ValidationError) -> Self {
        Self {
            field: error.field.to_string(),
            code: "invalid".to_owned(),
            message: error.message.to_string(),
            params: None,
        }
    }
}

/// HTTP error response representation.
///
/// Only `name`, `message`, `resource`, `suggestion` and `validation` reach
/// the client; context and status stay on the server side.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse<'a> {
    /// The error name/type identifier
    pub name: Cow<'a, str>,
    /// User-friendly error message safe for client display
    pub message: Cow<'a, str>,
    /// The resource that the error relates to (optional, set by handler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    /// Helpful suggestion for resolving the error (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Cow<'a, str>>,
    /// Validation error details for field-specific errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Vec<ValidationErrorDetail>>,

    /// Internal context for debugging (optional, not exposed to client)
    #[serde(skip)]
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code (not serialized in JSON)
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "Invalid request data.",
        StatusCode::BAD_REQUEST,
    );
    pub const NOT_FOUND: Self =
        Self::new("not_found", "Resource not found.", StatusCode::NOT_FOUND);
    pub const PAYLOAD_TOO_LARGE: Self = Self::new(
        "payload_too_large",
        "Payload too large.",
        StatusCode::PAYLOAD_TOO_LARGE,
    );
    pub const TOO_MANY_REQUESTS: Self = Self::new(
        "too_many_requests",
        "Rate limit exceeded.",
        StatusCode::TOO_MANY_REQUESTS,
    );
    pub const UNAUTHORIZED: Self = Self::new(
        "unauthorized",
        "Authentication required.",
        StatusCode::UNAUTHORIZED,
    );
    pub const VALIDATION_ERROR: Self = Self::new(
        "validation_error",
        "Validation failed.",
        StatusCode::BAD_REQUEST,
    );
    // 5xx Server Errors
    pub const GATEWAY_TIMEOUT: Self = Self::new(
        "gateway_timeout",
        "Request timed out.",
        StatusCode::GATEWAY_TIMEOUT,
    );
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "Internal server error.",
        StatusCode::INTERNAL_SERVER_ERROR,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            context: None,
            suggestion: None,
            validation: None,
            status,
        }
    }

    /// Creates a new error response with custom resource.
    /// If a resource already exists, it merges them with a separator.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{}/{}", existing, new_resource)),
            None => new_resource,
        });
        self
    }

    /// Creates a new error response with custom message.
    /// Appends the new message to the existing message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        let new_message = message.into();
        let base = self.message.trim_end_matches('.');
        self.message = Cow::Owned(format!("{}. {}", base, new_message));
        self
    }

    /// Attaches context to the error response.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{}; {}", existing, new_context)),
            None => new_context,
        });
        self
    }

    /// Attaches a suggestion to the error response.
    pub fn with_suggestion(mut self, suggestion: impl Into<Cow<'a, str>>) -> Self {
        let new_suggestion = suggestion.into();
        self.suggestion = Some(match self.suggestion {
            Some(existing) => Cow::Owned(format!("{}; {}", existing, new_suggestion)),
            None => new_suggestion,
        });
        self
    }

    /// Adds validation errors to the error response.
    pub fn with_validation_errors(mut self, errors: Vec<ValidationErrorDetail>) -> Self {
        self.validation = Some(errors);
        self
    }

    /// Creates an error response from validator ValidationErrors.
    pub fn from_validation_errors(validation_errors: ValidationErrors) -> Self {
        let mut error_details = Vec::new();

        for (field, field_errors) in validation_errors.field_errors() {
            for error in field_errors {
                let params: HashMap<_, _> = error
                    .params
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect();

                error_details.push(ValidationErrorDetail {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Validation failed for field '{}'", field)),
                    params: (!params.is_empty()).then_some(params),
                });
            }
        }

        Self::VALIDATION_ERROR.with_validation_errors(error_details)
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl From<ValidationErrors> for ErrorResponse<'_> {
    fn from(errors: ValidationErrors) -> Self {
        Self::from_validation_errors(errors)
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        tracing::debug!(
            target: TRACING_TARGET,
            status = %self.status,
            name = %self.name,
            message = %self.message,
            resource = ?self.resource,
            context = ?self.context,
            "HTTP error response"
        );
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[test]
    fn error_response_merging_message() {
        let response = ErrorResponse::BAD_REQUEST
            .with_message("Invalid format")
            .with_message("Missing required field");

        assert_eq!(
            &response.message,
            "Invalid request data. Invalid format. Missing required field"
        );
    }

    #[test]
    fn error_response_merging_context() {
        let response = ErrorResponse::INTERNAL_SERVER_ERROR
            .with_context("Hashing failed")
            .with_context("Blocking pool saturated");

        assert_eq!(
            response.context.as_deref(),
            Some("Hashing failed; Blocking pool saturated")
        );
    }

    #[test]
    fn error_response_serialization() -> anyhow::Result<()> {
        let response = ErrorResponse::BAD_REQUEST
            .with_resource("bookmark")
            .with_message("Test message")
            .with_context("Test context")
            .with_suggestion("Try fixing the data");

        let json = serde_json::to_string(&response)?;

        assert!(json.contains("name"));
        assert!(json.contains("message"));
        assert!(json.contains("resource"));
        assert!(json.contains("suggestion"));

        assert!(!json.contains("context"));
        assert!(!json.contains("status"));
        assert!(!json.contains("validation"));
        Ok(())
    }

    #[test]
    fn validator_errors_become_details() {
        #[derive(Validate)]
        struct Login {
            #[validate(length(min = 3, message = "too short"))]
            username: String,
        }

        let errors = Login {
            username: "ab".to_owned(),
        }
        .validate()
        .err();

        let response = errors.map(ErrorResponse::from_validation_errors);
        let details = response.and_then(|r| r.validation).unwrap_or_default();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].field, "username");
        assert_eq!(details[0].message, "too short");
    }
}
