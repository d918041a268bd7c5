//! Adapters for `#[validate(custom(function = "..."))]` attributes.
//!
//! Request types in the business layer reuse the [`FieldKind`] rules through
//! these functions:
//!
//! ```rust,ignore
//! #[derive(Deserialize, Validate)]
//! struct CreateBookmark {
//!     #[validate(custom(function = "markly_server::service::validate_url"))]
//!     url: String,
//!     #[validate(custom(function = "markly_server::service::validate_tags"))]
//!     tags: Vec<String>,
//! }
//! ```

use validator::ValidationError;

use super::{FieldKind, check_tags};

/// Checks `value` against the rules of `kind`, reporting failures in the
/// `validator` error format.
pub fn validate_field(kind: FieldKind, value: &str) -> Result<(), ValidationError> {
    kind.check(value).map(drop).map_err(|error| {
        ValidationError::new(kind.field_name()).with_message(error.message)
    })
}

/// Rejects an empty or malformed email and one over 254 bytes.
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Email, value)
}

/// Accepts `http` and `https` URLs of at most 2048 bytes.
pub fn validate_url(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Url, value)
}

/// Accepts 3 to 30 letters, digits or underscores.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Username, value)
}

/// Requires 8 to [`MAX_PASSWORD_LEN`] bytes with an uppercase letter, a
/// lowercase letter and a digit.
///
/// [`MAX_PASSWORD_LEN`]: crate::service::MAX_PASSWORD_LEN
pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Password, value)
}

/// Requires a title of at most 255 characters once sanitized.
pub fn validate_title(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Title, value)
}

/// Limits a sanitized description to 1000 characters.
pub fn validate_description(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Description, value)
}

/// Limits sanitized notes to 2000 characters.
pub fn validate_notes(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Notes, value)
}

/// Requires 2 to 50 characters once sanitized. Errors are reported under `name`.
pub fn validate_collection_name(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::CollectionName, value)
}

/// Accepts an empty value or a `#rrggbb` hex color in either case.
pub fn validate_color(value: &str) -> Result<(), ValidationError> {
    validate_field(FieldKind::Color, value)
}

/// Checks a whole tag list, including the tag count.
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    check_tags(tags)
        .map(drop)
        .map_err(|error| ValidationError::new("tags").with_message(error.message))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use validator::Validate;

    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct CreateBookmark {
        #[validate(custom(function = "validate_url"))]
        url: String,
        #[validate(custom(function = "validate_title"))]
        title: String,
        #[validate(custom(function = "validate_tags"))]
        tags: Vec<String>,
        #[validate(custom(function = "validate_color"))]
        color: String,
    }

    #[test]
    fn valid_request_passes() -> anyhow::Result<()> {
        let request: CreateBookmark = serde_json::from_value(serde_json::json!({
            "url": "https://www.rust-lang.org/",
            "title": "Rust",
            "tags": ["rust", "Lang"],
            "color": "",
        }))?;
        request.validate()?;
        Ok(())
    }

    #[test]
    fn invalid_fields_are_reported() -> anyhow::Result<()> {
        let request: CreateBookmark = serde_json::from_value(serde_json::json!({
            "url": "javascript:alert(1)",
            "title": "   ",
            "tags": ["ok", "bad tag"],
            "color": "blue",
        }))?;

        let errors = request.validate().err();
        let fields = errors.as_ref().map(|e| e.field_errors().len());
        assert_eq!(fields, Some(4));
        Ok(())
    }

    #[test]
    fn adapter_carries_the_message() {
        let error = validate_username("ab").err();
        assert_eq!(error.as_ref().map(|e| e.code.as_ref()), Some("username"));
        assert!(error.and_then(|e| e.message).is_some());
        assert!(validate_password("Passw0rd!").is_ok());
        assert!(validate_email("bob@example.com").is_ok());
        assert!(validate_collection_name("x").is_err());
        assert!(validate_description("").is_ok());
        assert!(validate_notes("").is_ok());
    }

    #[test]
    fn adapters_enforce_their_bounds() {
        let password = format!("Aa1{}", "x".repeat(crate::service::MAX_PASSWORD_LEN - 3));
        assert!(validate_password(&password).is_ok());
        assert!(validate_password(&format!("{password}x")).is_err());

        assert!(validate_title(&"a".repeat(255)).is_ok());
        assert!(validate_title(&"a".repeat(256)).is_err());
        assert!(validate_description(&"a".repeat(1001)).is_err());
        assert!(validate_notes(&"a".repeat(2001)).is_err());

        let error = validate_collection_name("x").err();
        assert_eq!(error.map(|e| e.code), Some("name".into()));

        assert!(validate_color("#FF00aa").is_ok());
        assert!(validate_url("ftp://example.com/").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(250))).is_err());
    }
}
