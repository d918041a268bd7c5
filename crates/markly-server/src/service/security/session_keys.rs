//! Symmetric session keys for issuing and verifying identity tokens.
//!
//! Tokens are JWTs signed with an HMAC algorithm (HS256 on issuance; HS384
//! and HS512 are also accepted on verification). The shared secret must be
//! at least [`MIN_SECRET_LEN`] bytes; a shorter secret fails every issue and
//! verify call with [`TokenError::WeakSecret`].

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::extract::{AuthClaims, Identity};
use crate::utility::tracing_targets::SESSION_KEYS as TRACING_TARGET;
use crate::{Error, Result};

/// Minimum accepted length of the token secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Algorithms accepted on verification.
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Token issuance and verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum TokenError {
    /// The secret is shorter than [`MIN_SECRET_LEN`] bytes.
    #[error("token secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
    /// The token header names a non-HMAC algorithm (including `none`).
    #[error("token is not signed with an HMAC algorithm")]
    InvalidSignatureMethod,
    /// The token's `exp` is in the past.
    #[error("token has expired")]
    Expired,
    /// The token's `nbf` is in the future.
    #[error("token is not valid yet")]
    NotYetValid,
    /// The token could not be decoded or its claims are invalid.
    #[error("token is malformed")]
    Malformed,
    /// The signature does not match the token contents.
    #[error("token signature does not match")]
    SignatureMismatch,
    /// The token could not be produced.
    #[error("token could not be issued")]
    Signing,
}

impl TokenError {
    /// Returns a stable identifier for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WeakSecret => "weak_secret",
            Self::InvalidSignatureMethod => "invalid_signature_method",
            Self::Expired => "expired_token",
            Self::NotYetValid => "not_yet_valid",
            Self::Malformed => "malformed_token",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Signing => "signing_failed",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        match error.kind() {
            JwtErrorKind::ExpiredSignature => Self::Expired,
            JwtErrorKind::ImmatureSignature => Self::NotYetValid,
            JwtErrorKind::InvalidSignature => Self::SignatureMismatch,
            JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => {
                Self::InvalidSignatureMethod
            }
            _ => Self::Malformed,
        }
    }
}

/// Token secret and lifetime configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionKeysConfig {
    /// Shared HMAC secret used to sign and verify tokens (at least 32 bytes).
    pub jwt_secret: String,

    /// Default token lifetime in seconds.
    #[serde(default = "SessionKeysConfig::default_expiry_secs")]
    pub jwt_expiry_secs: u64,
}

impl SessionKeysConfig {
    fn default_expiry_secs() -> u64 {
        86_400
    }

    /// Creates a configuration with the default token lifetime.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiry_secs: Self::default_expiry_secs(),
        }
    }

    /// Returns the default token lifetime.
    pub fn expiry(&self) -> SignedDuration {
        SignedDuration::from_secs(i64::try_from(self.jwt_expiry_secs).unwrap_or(i64::MAX))
    }
}

impl fmt::Debug for SessionKeysConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeysConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiry_secs", &self.jwt_expiry_secs)
            .finish()
    }
}

/// Keys used for issuing and verifying identity tokens.
///
/// Cheap to clone; the key material is shared.
#[derive(Clone)]
pub struct SessionKeys {
    inner: Arc<SessionKeysInner>,
}

struct SessionKeysInner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: SignedDuration,
}

impl SessionKeys {
    /// Creates keys from a raw secret, rejecting secrets shorter than [`MIN_SECRET_LEN`].
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        Self::with_default_ttl(secret.as_ref(), SignedDuration::from_hours(24))
    }

    fn with_default_ttl(secret: &[u8], default_ttl: SignedDuration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            tracing::error!(
                target: TRACING_TARGET,
                secret_len = secret.len(),
                min_len = MIN_SECRET_LEN,
                "refusing to use a weak token secret"
            );
            return Err(TokenError::WeakSecret);
        }

        let inner = SessionKeysInner {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            default_ttl,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Creates keys from configuration.
    pub fn from_config(config: &SessionKeysConfig) -> Result<Self> {
        let keys = Self::with_default_ttl(config.jwt_secret.as_bytes(), config.expiry())
            .map_err(|e| Error::auth("invalid token secret").with_source(e))?;

        tracing::info!(
            target: TRACING_TARGET,
            default_ttl_secs = config.jwt_expiry_secs,
            "session keys loaded"
        );

        Ok(keys)
    }

    /// Returns the lifetime used by [`Self::issue_default`].
    #[inline]
    pub fn default_ttl(&self) -> SignedDuration {
        self.inner.default_ttl
    }

    /// Issues a signed token for `identity` that expires after `ttl`.
    ///
    /// A zero or negative `ttl` yields a token that is already expired.
    pub fn issue(&self, identity: &Identity, ttl: SignedDuration) -> Result<String, TokenError> {
        let issued_at = Timestamp::now();
        let expires_at = issued_at.checked_add(ttl).map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET,
                error = %e,
                ttl_secs = ttl.as_secs(),
                "token lifetime is out of range"
            );
            TokenError::Signing
        })?;

        let token_id = hex::encode(rand::random::<[u8; 16]>());
        let claims = AuthClaims::new(identity, token_id, issued_at, expires_at);

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.inner.encoding_key,
        )
        .map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET,
                error = %e,
                user_id = identity.id,
                "failed to encode token"
            );
            TokenError::Signing
        })?;

        tracing::debug!(
            target: TRACING_TARGET,
            user_id = identity.id,
            token_id = %claims.token_id,
            expires_at = %expires_at,
            "token issued"
        );

        Ok(token)
    }

    /// Issues a token with the configured default lifetime.
    pub fn issue_default(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue(identity, self.inner.default_ttl)
    }

    /// Verifies a token and returns its claims.
    ///
    /// The header algorithm is checked before any signature work, so a token
    /// announcing a non-HMAC algorithm fails with
    /// [`TokenError::InvalidSignatureMethod`] whether or not it is otherwise valid.
    pub fn verify(&self, token: &str) -> Result<AuthClaims, TokenError> {
        let algorithm = header_algorithm(token)?;

        let mut validation = Validation::new(algorithm);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[AuthClaims::JWT_ISSUER]);
        validation.set_audience(&[AuthClaims::JWT_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        let claims = decode::<AuthClaims>(token, &self.inner.decoding_key, &validation)
            .map_err(TokenError::from)?
            .claims;

        tracing::debug!(
            target: TRACING_TARGET,
            user_id = claims.user_id,
            token_id = %claims.token_id,
            "token verified"
        );

        Ok(claims)
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("default_ttl", &self.inner.default_ttl)
            .finish_non_exhaustive()
    }
}

/// Reads the `alg` field of the token header and requires an HMAC algorithm.
fn header_algorithm(token: &str) -> Result<Algorithm, TokenError> {
    #[derive(Deserialize)]
    struct RawHeader {
        alg: String,
    }

    let mut segments = token.split('.');
    let (Some(header), Some(_), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed)?;
    let raw: RawHeader = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

    match raw.alg.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(TokenError::InvalidSignatureMethod),
    }
}

/// Issues a token for the given subject with a raw secret.
pub fn issue_token(
    user_id: u64,
    username: &str,
    email: &str,
    secret: impl AsRef<[u8]>,
    ttl: SignedDuration,
) -> Result<String, TokenError> {
    let keys = SessionKeys::from_secret(secret)?;
    keys.issue(&Identity::new(user_id, username, email), ttl)
}

/// Verifies a token with a raw secret.
pub fn verify_token(token: &str, secret: impl AsRef<[u8]>) -> Result<AuthClaims, TokenError> {
    let keys = SessionKeys::from_secret(secret)?;
    keys.verify(token)
}
