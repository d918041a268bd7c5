//! Free-text sanitization.
//!
//! Markup characters are HTML-escaped and script-capable URL schemes are
//! stripped. An `&` that already starts a character reference is kept, which
//! makes [`sanitize`] idempotent: sanitizing a sanitized value returns it
//! unchanged.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum number of distinct tags a bookmark may carry.
pub const MAX_TAGS: usize = 20;

/// Named, decimal or hexadecimal character reference.
static CHARACTER_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[a-zA-Z][a-zA-Z0-9]*|#[0-9]+|#[xX][0-9a-fA-F]+);")
        .expect("character reference pattern is valid")
});

/// URL schemes that can execute code when rendered as a link.
static DANGEROUS_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:javascript|vbscript|data):")
        .expect("scheme pattern is valid")
});

/// Escapes markup, strips `javascript:`, `vbscript:` and `data:` schemes
/// (case-insensitively) and trims surrounding whitespace.
///
/// Never fails.
pub fn sanitize(input: &str) -> String {
    let mut value = escape_html(input).into_owned();

    // Removing a scheme can join the remaining halves into a new one.
    while DANGEROUS_SCHEME.is_match(&value) {
        value = DANGEROUS_SCHEME.replace_all(&value, "").into_owned();
    }

    value.trim().to_owned()
}

/// HTML-escapes `<`, `>`, `"`, `'` and any `&` that does not begin a
/// character reference.
fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['<', '>', '"', '\'', '&']) {
        return Cow::Borrowed(input);
    }

    let mut escaped = String::with_capacity(input.len() + input.len() / 4);
    for (index, ch) in input.char_indices() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            '&' if !CHARACTER_REFERENCE.is_match(&input[index..]) => escaped.push_str("&amp;"),
            _ => escaped.push(ch),
        }
    }

    Cow::Owned(escaped)
}

/// Lower-cases, sanitizes and deduplicates tags.
///
/// Empty tags are dropped, the first occurrence wins and insertion order is
/// preserved. Every distinct tag is kept; the [`MAX_TAGS`] limit is enforced
/// by `check_tags`, which rejects longer lists.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();

    tags.into_iter()
        .map(|tag| sanitize(&tag.as_ref().trim().to_lowercase()))
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_script_tags() {
        let sanitized = sanitize("<script>alert(1)</script>");
        assert_eq!(sanitized, "&lt;script&gt;alert(1)&lt;/script&gt;");
        assert!(!sanitized.contains("<script"));
    }

    #[test]
    fn escapes_quotes_and_bare_ampersands() {
        assert_eq!(sanitize(r#"Tom & "Jerry's""#), "Tom &amp; &#34;Jerry&#39;s&#34;");
        assert_eq!(sanitize("&copy; &#169; &#xA9;"), "&copy; &#169; &#xA9;");
    }

    #[test]
    fn strips_dangerous_schemes() {
        assert_eq!(sanitize("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(sanitize(" vbscript:msgbox "), "msgbox");
        assert_eq!(sanitize("data:text/html,hi"), "text/html,hi");
        assert_eq!(sanitize("javajavascript:script:void(0)"), "void(0)");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(sanitize("  Rust in Action  "), "Rust in Action");
        assert!(matches!(escape_html("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "<b>bold</b>",
            "a & b",
            "&data:x",
            "&#data:39;",
            "jav&#x61;script:",
            "Fish & Chips &amp; more",
            "'quoted' \"double\"",
        ];

        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn tags_are_normalized_in_order() {
        let tags = normalize_tags(["Rust", " rust ", "", "Web-Dev", "  ", "RUST", "cli"]);
        assert_eq!(tags, ["rust", "web-dev", "cli"]);
    }

    #[test]
    fn long_tag_lists_are_kept_whole() {
        let tags = normalize_tags((0..30).map(|i| format!("tag-{i}")));
        assert_eq!(tags.len(), 30);
        assert_eq!(tags.last().map(String::as_str), Some("tag-29"));
        assert!(crate::service::check_tags(&tags).is_err());
    }
}
