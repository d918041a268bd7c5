//! Centralized tracing target constants for structured logging.
//!
//! Using consistent targets enables fine-grained control over log output
//! via tracing subscriber filters, e.g. `RUST_LOG=markly_server::rate_limiter=debug`.

/// Bearer token extraction and verification in the request pipeline.
pub const AUTHENTICATION: &str = "markly_server::authentication";

/// Password hashing and verification operations.
pub const PASSWORD_HASHER: &str = "markly_server::password_hasher";

/// Token signing and verification.
pub const SESSION_KEYS: &str = "markly_server::session_keys";

/// Token bucket checks, evictions and idle sweeps.
pub const RATE_LIMITER: &str = "markly_server::rate_limiter";

/// Field validation and query-string sanitization.
pub const VALIDATION: &str = "markly_server::validation";

/// Request hardening (body limits, header configuration).
pub const SECURITY: &str = "markly_server::security";

/// Error recovery including middleware errors and request failures.
pub const RECOVERY_ERROR: &str = "markly_server::recovery::error";

/// Panic recovery including handler panics and service failures.
pub const RECOVERY_PANIC: &str = "markly_server::recovery::panic";

/// Service state construction.
pub const SERVICE: &str = "markly_server::service";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_share_the_crate_prefix_and_are_distinct() {
        let targets = [
            AUTHENTICATION,
            PASSWORD_HASHER,
            SESSION_KEYS,
            RATE_LIMITER,
            VALIDATION,
            SECURITY,
            RECOVERY_ERROR,
            RECOVERY_PANIC,
            SERVICE,
        ];

        for (i, target) in targets.iter().enumerate() {
            assert!(target.starts_with("markly_server::"), "{target}");
            assert!(!targets[i + 1..].contains(target), "duplicate target {target}");
        }
    }
}
