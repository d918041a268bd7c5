//! Session response types.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::extract::{AuthClaims, Identity};

/// Identity of the caller together with the lifetime of the presented token.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The authenticated caller.
    #[serde(flatten)]
    pub identity: Identity,
    /// Id of the token the request was authenticated with.
    pub token_id: String,
    /// When the token stops being accepted.
    pub expires_at: Timestamp,
}

impl From<&AuthClaims> for Session {
    fn from(auth_claims: &AuthClaims) -> Self {
        Self {
            identity: auth_claims.identity(),
            token_id: auth_claims.token_id.clone(),
            expires_at: auth_claims.expires_at,
        }
    }
}
