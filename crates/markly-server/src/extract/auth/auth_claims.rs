use std::borrow::Cow;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use super::Identity;

/// JWT claims for identity tokens.
///
/// Carries the RFC 7519 registered claims plus exactly the private claims
/// needed to rebuild an [`Identity`], so verification needs no lookup.
/// Timestamps are encoded as NumericDate (whole seconds since the epoch).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthClaims {
    // Standard (or registered) claims.
    /// Issuer (who created the token).
    #[serde(rename = "iss")]
    issued_by: Cow<'static, str>,
    /// Audience (who the token is intended for).
    #[serde(rename = "aud")]
    audience: Cow<'static, str>,

    /// JWT ID (128 random bits, hex-encoded).
    #[serde(rename = "jti")]
    pub token_id: String,
    /// Subject (numeric user id, encoded as a decimal string).
    #[serde(rename = "sub", with = "subject")]
    pub user_id: u64,

    /// Issued at.
    #[serde(rename = "iat", with = "jiff::fmt::serde::timestamp::second::required")]
    pub issued_at: Timestamp,
    /// Not before.
    #[serde(rename = "nbf", with = "jiff::fmt::serde::timestamp::second::required")]
    pub not_before: Timestamp,
    /// Expiration time.
    #[serde(rename = "exp", with = "jiff::fmt::serde::timestamp::second::required")]
    pub expires_at: Timestamp,

    // Private (or custom) claims.
    /// Username of the subject.
    pub username: String,
    /// Email of the subject.
    pub email: String,
}

impl AuthClaims {
    /// Issuer identifier written into and required from every token.
    pub const JWT_ISSUER: &str = "markly";
    /// Audience identifier written into and required from every token.
    pub const JWT_AUDIENCE: &str = "markly-frontend";

    /// Creates claims for `identity` valid from `issued_at` until `expires_at`.
    pub(crate) fn new(
        identity: &Identity,
        token_id: String,
        issued_at: Timestamp,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            issued_by: Cow::Borrowed(Self::JWT_ISSUER),
            audience: Cow::Borrowed(Self::JWT_AUDIENCE),
            token_id,
            user_id: identity.id,
            issued_at,
            not_before: issued_at,
            expires_at,
            username: identity.username.clone(),
            email: identity.email.clone(),
        }
    }

    /// Returns the token issuer.
    #[inline]
    pub fn issuer(&self) -> &str {
        &self.issued_by
    }

    /// Returns the token audience.
    #[inline]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Rebuilds the [`Identity`] carried by these claims.
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id, self.username.clone(), self.email.clone())
    }

    /// Checks if the token has expired based on current UTC time.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Timestamp::now()
    }

    /// Returns the remaining lifetime of this token, or zero if already expired.
    #[must_use]
    pub fn remaining_lifetime(&self) -> SignedDuration {
        let remaining = self.expires_at.duration_since(Timestamp::now());
        if remaining.is_positive() {
            remaining
        } else {
            SignedDuration::ZERO
        }
    }
}

/// The `sub` claim is a string per RFC 7519; user ids are numeric.
mod subject {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(user_id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(user_id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(ttl: SignedDuration) -> AuthClaims {
        let now = Timestamp::now();
        let identity = Identity::new(7, "alice", "alice@example.com");
        AuthClaims::new(&identity, "00ff".to_owned(), now, now + ttl)
    }

    #[test]
    fn serializes_registered_claims() -> anyhow::Result<()> {
        let claims = claims(SignedDuration::from_hours(1));
        let json = serde_json::to_value(&claims)?;

        assert_eq!(json["iss"], "markly");
        assert_eq!(json["aud"], "markly-frontend");
        assert_eq!(json["sub"], "7");
        assert!(json["exp"].is_i64());
        assert!(json["nbf"].is_i64());
        assert_eq!(json["username"], "alice");
        Ok(())
    }

    #[test]
    fn identity_round_trips_through_claims() -> anyhow::Result<()> {
        let claims = claims(SignedDuration::from_hours(1));
        let decoded: AuthClaims = serde_json::from_str(&serde_json::to_string(&claims)?)?;

        assert_eq!(
            decoded.identity(),
            Identity::new(7, "alice", "alice@example.com")
        );
        assert!(!decoded.is_expired());
        assert!(decoded.remaining_lifetime() > SignedDuration::ZERO);
        Ok(())
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let json = r#"{"iss":"markly","aud":"markly-frontend","jti":"ab","sub":"bob",
            "iat":1,"nbf":1,"exp":2,"username":"bob","email":"bob@example.com"}"#;
        assert!(serde_json::from_str::<AuthClaims>(json).is_err());
    }

    #[test]
    fn expired_claims_have_no_remaining_lifetime() {
        let claims = claims(SignedDuration::from_secs(-5));
        assert!(claims.is_expired());
        assert_eq!(claims.remaining_lifetime(), SignedDuration::ZERO);
    }
}
