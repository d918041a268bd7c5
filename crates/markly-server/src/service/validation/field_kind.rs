use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::sanitizer::{MAX_TAGS, normalize_tags, sanitize};
use crate::service::MAX_PASSWORD_LEN;
use crate::utility::tracing_targets::VALIDATION as TRACING_TARGET;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*(:[0-9]{1,5})?([/?#].*)?$",
    )
    .expect("url pattern is valid")
});

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("username pattern is valid"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("tag pattern is valid"));

static COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9a-f]{6}$").expect("color pattern is valid"));

/// A rejected field value.
///
/// Always names the field it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the rejected field.
    pub field: Cow<'static, str>,
    /// Human-readable reason.
    pub message: Cow<'static, str>,
}

impl ValidationError {
    /// Creates a new [`ValidationError`].
    pub fn new(
        field: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Reports the error under a different field name.
    pub fn with_field(mut self, field: impl Into<Cow<'static, str>>) -> Self {
        self.field = field.into();
        self
    }
}

/// Outcome of [`validate`]: the normalized value and whether it is acceptable.
///
/// The normalized value is returned even when the value is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Normalized (trimmed, escaped or lower-cased per kind) value.
    pub value: String,
    /// Whether the value satisfies every rule of its kind.
    pub accepted: bool,
}

/// Closed set of user-supplied fields, each with a fixed normalization and rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(strum::Display, strum::EnumString, strum::EnumIter, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
    /// Account email; trimmed and lower-cased, at most 254 bytes.
    Email,
    /// Bookmark target; `http` or `https`, at most 2048 bytes.
    Url,
    /// Account name; 3 to 30 letters, digits or underscores.
    Username,
    /// Account password; 8 to 71 bytes (the bcrypt input limit) with upper,
    /// lower and digit. Never altered.
    Password,
    /// Bookmark title; sanitized, required, at most 255 characters.
    Title,
    /// Bookmark description; sanitized, optional, at most 1000 characters.
    Description,
    /// Bookmark notes; sanitized, optional, at most 2000 characters.
    Notes,
    /// Single tag; lower-cased, 1 to 50 bytes of `[a-z0-9-]`.
    Tag,
    /// Collection name; sanitized, 2 to 50 characters.
    CollectionName,
    /// Collection color; optional `#rrggbb` hex, lower-cased.
    Color,
    /// Anything else; sanitized and always accepted.
    FreeText,
}

impl FieldKind {
    /// Returns the field name used in validation errors.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::CollectionName => "name",
            Self::FreeText => "text",
            other => other.into(),
        }
    }

    /// Applies this kind's normalization without checking any rule.
    pub fn normalize(self, value: &str) -> String {
        match self {
            Self::Email | Self::Color => value.trim().to_lowercase(),
            Self::Url | Self::Username => value.trim().to_owned(),
            Self::Password => value.to_owned(),
            Self::Tag => sanitize(&value.trim().to_lowercase()),
            Self::Title
            | Self::Description
            | Self::Notes
            | Self::CollectionName
            | Self::FreeText => sanitize(value),
        }
    }

    /// Checks an already normalized value against this kind's rules.
    pub fn constrain(self, value: &str) -> Result<(), ValidationError> {
        let reject = |message: &'static str| -> Result<(), ValidationError> {
            Err(ValidationError::new(self.field_name(), message))
        };
        let chars = || value.chars().count();

        match self {
            Self::Email => {
                if value.is_empty() {
                    return reject("email is required");
                }
                if value.len() > 254 {
                    return reject("email is too long");
                }
                if !EMAIL.is_match(value) {
                    return reject("invalid email format");
                }
            }
            Self::Url => {
                if value.is_empty() {
                    return reject("url is required");
                }
                if value.len() > 2048 {
                    return reject("url is too long");
                }
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return reject("url must start with http:// or https://");
                }
                if !HTTP_URL.is_match(value) || url::Url::parse(value).is_err() {
                    return reject("invalid url format");
                }
            }
            Self::Username => {
                if value.len() < 3 {
                    return reject("username must be at least 3 characters long");
                }
                if value.len() > 30 {
                    return reject("username must be at most 30 characters long");
                }
                if !USERNAME.is_match(value) {
                    return reject("username can only contain letters, numbers and underscores");
                }
            }
            Self::Password => {
                if value.len() < 8 {
                    return reject("password must be at least 8 characters long");
                }
                if value.len() > MAX_PASSWORD_LEN {
                    return reject("password is too long");
                }
                let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
                let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
                let has_digit = value.chars().any(|c| c.is_ascii_digit());
                if !(has_upper && has_lower && has_digit) {
                    return reject(
                        "password must contain an uppercase letter, a lowercase letter and a number",
                    );
                }
            }
            Self::Title => {
                if value.is_empty() {
                    return reject("title is required");
                }
                if chars() > 255 {
                    return reject("title is too long");
                }
            }
            Self::Description => {
                if chars() > 1000 {
                    return reject("description is too long");
                }
            }
            Self::Notes => {
                if chars() > 2000 {
                    return reject("notes are too long");
                }
            }
            Self::Tag => {
                if value.is_empty() {
                    return reject("tag cannot be empty");
                }
                if value.len() > 50 {
                    return reject("tag is too long (maximum 50 characters)");
                }
                if !TAG.is_match(value) {
                    return reject("tags can only contain letters, numbers and hyphens");
                }
            }
            Self::CollectionName => {
                if value.is_empty() {
                    return reject("collection name is required");
                }
                if chars() < 2 {
                    return reject("collection name must be at least 2 characters long");
                }
                if chars() > 50 {
                    return reject("collection name is too long");
                }
            }
            Self::Color => {
                if !value.is_empty() && !COLOR.is_match(value) {
                    return reject("invalid color format (must be a hex color like #ff0000)");
                }
            }
            Self::FreeText => {}
        }

        Ok(())
    }

    /// Normalizes `value` and checks it, returning the normalized value on success.
    pub fn check(self, value: &str) -> Result<String, ValidationError> {
        let normalized = self.normalize(value);
        match self.constrain(&normalized) {
            Ok(()) => Ok(normalized),
            Err(error) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    field = %error.field,
                    reason = %error.message,
                    "field value rejected"
                );
                Err(error)
            }
        }
    }

    /// Normalizes and checks `value`, reporting the outcome as a [`Validation`].
    pub fn validate(self, value: &str) -> Validation {
        let value = self.normalize(value);
        let accepted = self.constrain(&value).is_ok();
        Validation { value, accepted }
    }
}

/// Normalizes and checks `value` as a field of the given kind.
///
/// Pure: the same input always yields the same [`Validation`], and feeding an
/// accepted value back in returns it unchanged.
pub fn validate(value: &str, kind: FieldKind) -> Validation {
    kind.validate(value)
}

/// Normalizes a tag list and checks every tag.
///
/// Rejects lists with more than [`MAX_TAGS`] distinct tags instead of
/// truncating them.
pub fn check_tags<I, S>(tags: I) -> Result<Vec<String>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tags = normalize_tags(tags);
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::new(
            "tags",
            format!("too many tags (maximum {MAX_TAGS})"),
        ));
    }

    for tag in &tags {
        FieldKind::Tag
            .constrain(tag)
            .map_err(|error| error.with_field("tags"))?;
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn title_with_script_is_escaped_and_accepted() {
        let result = validate("<script>alert(1)</script>", FieldKind::Title);
        assert!(result.accepted);
        assert!(!result.value.contains("<script"));
        assert_eq!(result.value, "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[test]
    fn short_username_is_rejected() {
        assert!(!validate("ab", FieldKind::Username).accepted);
        assert!(validate("  alice_01 ", FieldKind::Username).accepted);
        assert!(!validate("alice!", FieldKind::Username).accepted);

        let error = FieldKind::Username.check("ab").err();
        assert_eq!(error.map(|e| e.field), Some(Cow::Borrowed("username")));
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let result = validate("  Alice@Example.COM ", FieldKind::Email);
        assert_eq!(result.value, "alice@example.com");
        assert!(result.accepted);
        assert!(!validate("alice@", FieldKind::Email).accepted);
        assert!(!validate(&format!("{}@example.com", "a".repeat(250)), FieldKind::Email).accepted);
    }

    #[test]
    fn urls_require_http_scheme() {
        assert!(validate("https://example.com/path?q=1", FieldKind::Url).accepted);
        assert!(validate("http://localhost:3000/", FieldKind::Url).accepted);
        assert!(!validate("javascript:alert(1)", FieldKind::Url).accepted);
        assert!(!validate("ftp://example.com", FieldKind::Url).accepted);
        assert!(!validate("https://-bad-.com", FieldKind::Url).accepted);
        assert!(!validate(&format!("https://example.com/{}", "a".repeat(2048)), FieldKind::Url).accepted);
    }

    #[test]
    fn password_rules() {
        assert!(validate("Secure123", FieldKind::Password).accepted);
        assert!(!validate("secure123", FieldKind::Password).accepted);
        assert!(!validate("SECURE123", FieldKind::Password).accepted);
        assert!(!validate("SecurePwd", FieldKind::Password).accepted);
        assert!(!validate("Sh0rt", FieldKind::Password).accepted);

        let longest = format!("Aa1{}", "x".repeat(MAX_PASSWORD_LEN - 3));
        assert!(validate(&longest, FieldKind::Password).accepted);
        assert!(!validate(&format!("{longest}y"), FieldKind::Password).accepted);

        // Passwords are never trimmed or escaped.
        let result = validate(" <Secure123> ", FieldKind::Password);
        assert_eq!(result.value, " <Secure123> ");
    }

    #[test]
    fn optional_fields_accept_empty_values() {
        assert!(validate("", FieldKind::Description).accepted);
        assert!(validate("", FieldKind::Notes).accepted);
        assert!(validate("", FieldKind::Color).accepted);
        assert!(!validate("", FieldKind::Title).accepted);
        assert!(!validate("", FieldKind::Tag).accepted);
    }

    #[test]
    fn length_is_measured_after_sanitizing() {
        assert!(validate(&"é".repeat(255), FieldKind::Title).accepted);
        assert!(!validate(&"<".repeat(64), FieldKind::Title).accepted);
        assert!(!validate(&"a".repeat(1001), FieldKind::Description).accepted);
        assert!(validate(&"a".repeat(2000), FieldKind::Notes).accepted);
        assert!(!validate(&"a".repeat(2001), FieldKind::Notes).accepted);
    }

    #[test]
    fn tags_and_colors() {
        let result = validate("  Rust-Lang ", FieldKind::Tag);
        assert_eq!(result.value, "rust-lang");
        assert!(result.accepted);
        assert!(!validate("c++", FieldKind::Tag).accepted);

        assert_eq!(validate("#FFAA00", FieldKind::Color).value, "#ffaa00");
        assert!(validate("#FFAA00", FieldKind::Color).accepted);
        assert!(!validate("red", FieldKind::Color).accepted);
    }

    #[test]
    fn collection_name_bounds() {
        assert!(!validate("a", FieldKind::CollectionName).accepted);
        assert!(validate("Reading list", FieldKind::CollectionName).accepted);
        assert!(!validate(&"x".repeat(51), FieldKind::CollectionName).accepted);
        assert_eq!(
            FieldKind::CollectionName.check("a").err().map(|e| e.field),
            Some(Cow::Borrowed("name"))
        );
    }

    #[test]
    fn free_text_is_always_accepted() {
        let result = validate(" javascript:<b>hi</b> ", FieldKind::FreeText);
        assert!(result.accepted);
        assert_eq!(result.value, "&lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn validation_is_idempotent_on_accepted_values() {
        let samples = [
            " Alice@Example.com ",
            "https://example.com/a?b=c&d=e",
            "alice_01",
            "Secure123",
            "<i>Tom & Jerry</i>",
            "Rust-Lang",
            "#ABCDEF",
            "Reading list",
            "data:hello",
        ];

        for kind in FieldKind::iter() {
            for sample in samples {
                let first = validate(sample, kind);
                if first.accepted {
                    assert_eq!(validate(&first.value, kind), first, "{kind} {sample:?}");
                }
            }
        }
    }

    #[test]
    fn tag_lists_are_checked() -> anyhow::Result<()> {
        let tags = check_tags(["Rust", "rust", "CLI"])?;
        assert_eq!(tags, ["rust", "cli"]);

        let error = check_tags(["ok", "not ok"]).err();
        assert_eq!(error.map(|e| e.field), Some(Cow::Borrowed("tags")));

        let many: Vec<String> = (0..21).map(|i| format!("t{i}")).collect();
        let error = check_tags(&many).err();
        assert_eq!(
            error.map(|e| e.message),
            Some(Cow::Borrowed("too many tags (maximum 20)"))
        );
        assert_eq!(check_tags(&many[..MAX_TAGS])?.len(), MAX_TAGS);
        Ok(())
    }

    #[test]
    fn kinds_parse_from_names() {
        assert_eq!("collection_name".parse::<FieldKind>().ok(), Some(FieldKind::CollectionName));
        assert_eq!(FieldKind::FreeText.to_string(), "free_text");
        assert_eq!(FieldKind::Email.field_name(), "email");
    }
}
