//! Security infrastructure services.
//!
//! Password hashing, identity token issuance and verification, and request
//! rate limiting.

mod password_hasher;
mod rate_limiter;
mod session_keys;

pub use password_hasher::{HashingError, MAX_PASSWORD_LEN, PasswordHasher};
pub use rate_limiter::{
    RateLimitConfig, RateLimitExceeded, RateLimitKey, RateLimitPolicy, RateLimiter, RateLimiters,
    RateLimitingConfig,
};
pub use session_keys::{
    MIN_SECRET_LEN, SessionKeys, SessionKeysConfig, TokenError, issue_token, verify_token,
};
