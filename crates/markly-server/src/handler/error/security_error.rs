//! Security service error to HTTP error conversion implementation.

use super::http_error::{Error as HttpError, ErrorKind};
use crate::handler::response::ValidationErrorDetail;
use crate::service::{HashingError, RateLimitExceeded, ValidationError};
use crate::utility::tracing_targets::SECURITY as TRACING_TARGET;

impl From<RateLimitExceeded> for HttpError<'static> {
    fn from(error: RateLimitExceeded) -> Self {
        let retry_after = error.retry_after_secs();

        ErrorKind::TooManyRequests
            .with_message(format!("Please try again in {retry_after} seconds"))
            .with_context(format!("{} limiter, key {}", error.policy, error.key))
    }
}

impl From<ValidationError> for HttpError<'static> {
    fn from(error: ValidationError) -> Self {
        tracing::debug!(
            target: TRACING_TARGET,
            field = %error.field,
            reason = %error.message,
            "request field rejected"
        );

        let detail = ValidationErrorDetail::from(&error);
        ErrorKind::ValidationError
            .with_resource(error.field.into_owned())
            .with_validation(vec![detail])
    }
}

impl From<HashingError> for HttpError<'static> {
    fn from(error: HashingError) -> Self {
        if let HashingError::TooLong(_) = error {
            return ValidationError::new("password", error.to_string()).into();
        }

        tracing::error!(
            target: TRACING_TARGET,
            error = %error,
            "credential hashing failed"
        );

        ErrorKind::InternalServerError.with_context(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;
    use crate::service::{RateLimitKey, RateLimitPolicy};

    #[test]
    fn rate_limit_maps_to_429() {
        let error = HttpError::from(RateLimitExceeded {
            key: RateLimitKey::Global,
            policy: RateLimitPolicy::Api,
            retry_after: Duration::from_millis(300),
        });

        assert_eq!(error.kind(), ErrorKind::TooManyRequests);
        assert_eq!(error.message(), Some("Please try again in 1 seconds"));
        assert_eq!(error.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn validation_error_names_the_field() {
        let error = HttpError::from(ValidationError::new("username", "too short"));

        assert_eq!(error.kind(), ErrorKind::ValidationError);
        assert_eq!(error.resource(), Some("username"));
        let details = error.validation().map(<[_]>::to_vec).unwrap_or_default();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].field, "username");
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn hashing_error_is_generic_500() {
        let digest_error = crate::service::PasswordHasher::default()
            .verify_password("password", "not-a-digest")
            .err();
        let error = digest_error.map(HttpError::from);

        assert_eq!(error.as_ref().map(|e| e.kind()), Some(ErrorKind::InternalServerError));
        assert_eq!(error.and_then(|e| e.message().map(str::to_owned)), None);
    }

    #[test]
    fn overlong_password_is_a_validation_error() {
        let hashing_error = crate::service::PasswordHasher::default()
            .hash_password(&"Aa1".repeat(30))
            .err();
        let error = hashing_error.map(HttpError::from);

        assert_eq!(error.as_ref().map(|e| e.kind()), Some(ErrorKind::ValidationError));
        assert_eq!(error.as_ref().and_then(|e| e.resource()), Some("password"));
    }
}
