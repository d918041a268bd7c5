//! Password hashing and verification using bcrypt.
//!
//! The work factor is clamped into [`PasswordHasher::COST_RANGE`] on
//! construction. The produced digest embeds the algorithm version, the cost
//! and a per-call random salt, and is stored by the business layer as is.
//!
//! bcrypt only reads 72 bytes of input, the terminating NUL included, so at
//! most [`MAX_PASSWORD_LEN`] password bytes count. Longer passwords are
//! refused instead of truncated, so two passwords that share a long prefix
//! never verify against each other.

use std::ops::RangeInclusive;

use bcrypt::BcryptError;

use crate::utility::tracing_targets::PASSWORD_HASHER as TRACING_TARGET;

/// Longest password bcrypt hashes without truncation, in bytes.
pub const MAX_PASSWORD_LEN: usize = 71;

/// Errors produced by [`PasswordHasher`].
///
/// A password mismatch is not an error: [`PasswordHasher::verify_password`]
/// returns `Ok(false)` for it.
#[derive(Debug, thiserror::Error)]
pub enum HashingError {
    /// The underlying bcrypt implementation failed to produce a digest.
    #[error("password hashing failed")]
    Failed(#[source] BcryptError),
    /// The password is longer than [`MAX_PASSWORD_LEN`] bytes.
    #[error("password exceeds {MAX_PASSWORD_LEN} bytes")]
    TooLong(usize),
    /// The stored digest could not be parsed.
    #[error("stored password digest is malformed")]
    MalformedDigest(#[source] BcryptError),
    /// The blocking hashing task was cancelled or panicked.
    #[error("password hashing task did not complete")]
    Interrupted,
}

/// Password hashing service with a clamped bcrypt work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Work factor used when none is configured.
    pub const DEFAULT_COST: u32 = 12;
    /// Accepted range of work factors; values outside are clamped.
    pub const COST_RANGE: RangeInclusive<u32> = 10..=15;

    /// Creates a new [`PasswordHasher`], clamping `cost` into [`Self::COST_RANGE`].
    pub fn new(cost: u32) -> Self {
        Self {
            cost: Self::clamp_cost(cost),
        }
    }

    /// Returns the effective (clamped) work factor.
    #[inline]
    pub const fn cost(&self) -> u32 {
        self.cost
    }

    #[inline]
    fn clamp_cost(cost: u32) -> u32 {
        cost.clamp(*Self::COST_RANGE.start(), *Self::COST_RANGE.end())
    }

    /// Hashes a password with the configured work factor and a fresh salt.
    pub fn hash_password(&self, password: &str) -> Result<String, HashingError> {
        self.hash_password_with_cost(password, self.cost)
    }

    /// Hashes a password with an explicit work factor, clamped like the default one.
    pub fn hash_password_with_cost(
        &self,
        password: &str,
        cost: u32,
    ) -> Result<String, HashingError> {
        let cost = Self::clamp_cost(cost);
        bcrypt::non_truncating_hash(password, cost).map_err(|e| {
            if let BcryptError::Truncation(_) = e {
                tracing::warn!(
                    target: TRACING_TARGET,
                    len = password.len(),
                    max_len = MAX_PASSWORD_LEN,
                    "refusing to hash an overlong password"
                );
                return HashingError::TooLong(password.len());
            }

            tracing::error!(
                target: TRACING_TARGET,
                error = %e,
                cost,
                "password hashing operation failed"
            );
            HashingError::Failed(e)
        })
    }

    /// Verifies a password against a stored digest.
    ///
    /// Returns `Ok(false)` on mismatch, including a password longer than
    /// [`MAX_PASSWORD_LEN`] bytes, which no digest can match. Only a
    /// malformed digest is an error.
    pub fn verify_password(&self, password: &str, digest: &str) -> Result<bool, HashingError> {
        match bcrypt::non_truncating_verify(password, digest) {
            Ok(matches) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    matches,
                    "password verification completed"
                );
                Ok(matches)
            }
            Err(BcryptError::Truncation(_)) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    len = password.len(),
                    "overlong password cannot match any digest"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    error = %e,
                    "invalid password digest format provided"
                );
                Err(HashingError::MalformedDigest(e))
            }
        }
    }

    /// Runs [`Self::hash_password`] on the blocking thread pool.
    ///
    /// Request timeouts drop the returned future; the hashing itself is not
    /// interrupted and its result is discarded.
    pub async fn hash_password_blocking(&self, password: String) -> Result<String, HashingError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash_password(&password))
            .await
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET, error = %e, "hashing task failed");
                HashingError::Interrupted
            })?
    }

    /// Runs [`Self::verify_password`] on the blocking thread pool.
    pub async fn verify_password_blocking(
        &self,
        password: String,
        digest: String,
    ) -> Result<bool, HashingError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify_password(&password, &digest))
            .await
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET, error = %e, "verification task failed");
                HashingError::Interrupted
            })?
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(*PasswordHasher::COST_RANGE.start())
    }

    #[test]
    fn cost_is_clamped() {
        assert_eq!(PasswordHasher::new(4).cost(), 10);
        assert_eq!(PasswordHasher::new(31).cost(), 15);
        assert_eq!(PasswordHasher::new(12).cost(), 12);
        assert_eq!(PasswordHasher::default().cost(), PasswordHasher::DEFAULT_COST);
    }

    #[test]
    fn hash_and_verify_password() -> anyhow::Result<()> {
        let hasher = fast_hasher();
        let hash = hasher.hash_password("Secure_password_123")?;

        assert!(hash.starts_with("$2b$10$"));
        assert!(hasher.verify_password("Secure_password_123", &hash)?);
        assert!(!hasher.verify_password("wrong_password", &hash)?);

        Ok(())
    }

    #[test]
    fn hash_produces_unique_salts() -> anyhow::Result<()> {
        let hasher = fast_hasher();

        let hash1 = hasher.hash_password("test_password")?;
        let hash2 = hasher.hash_password("test_password")?;

        assert_ne!(hash1, hash2);
        assert!(hasher.verify_password("test_password", &hash1)?);
        assert!(hasher.verify_password("test_password", &hash2)?);

        Ok(())
    }

    #[test]
    fn explicit_cost_is_clamped() -> anyhow::Result<()> {
        let hasher = fast_hasher();
        let hash = hasher.hash_password_with_cost("password", 1)?;
        assert!(hash.starts_with("$2b$10$"));
        Ok(())
    }

    #[test]
    fn malformed_digest_is_an_error() {
        let hasher = fast_hasher();
        let result = hasher.verify_password("password", "not_a_valid_hash_format");
        assert!(matches!(result, Err(HashingError::MalformedDigest(_))));
    }

    #[test]
    fn passwords_sharing_a_long_prefix_do_not_match() -> anyhow::Result<()> {
        let hasher = fast_hasher();
        let prefix = "Aa1".repeat(24);

        let stored = format!("{prefix}X-tail");
        let result = hasher.hash_password(&stored);
        assert!(matches!(result, Err(HashingError::TooLong(78))));

        let longest = &prefix[..MAX_PASSWORD_LEN];
        let hash = hasher.hash_password(longest)?;
        assert!(hasher.verify_password(longest, &hash)?);
        assert!(!hasher.verify_password(&prefix, &hash)?);
        assert!(!hasher.verify_password(&format!("{prefix}Y-other"), &hash)?);
        assert!(!hasher.verify_password(&stored, &hash)?);
        Ok(())
    }

    #[tokio::test]
    async fn blocking_helpers_round_trip() -> anyhow::Result<()> {
        let hasher = fast_hasher();
        let hash = hasher.hash_password_blocking("Passw0rd".to_owned()).await?;

        assert!(
            hasher
                .verify_password_blocking("Passw0rd".to_owned(), hash.clone())
                .await?
        );
        assert!(
            !hasher
                .verify_password_blocking("passw0rd".to_owned(), hash)
                .await?
        );
        Ok(())
    }
}
