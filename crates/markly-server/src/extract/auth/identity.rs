use serde::{Deserialize, Serialize};

/// The authenticated caller, reconstructed from verified token claims.
///
/// Never persisted by the pipeline; it lives in the request extensions for
/// the duration of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Numeric user identifier (the token subject).
    pub id: u64,
    /// Display username.
    pub username: String,
    /// Account email address.
    pub email: String,
}

impl Identity {
    /// Creates a new [`Identity`].
    pub fn new(id: u64, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Raw subject id of the authenticated caller.
///
/// Inserted next to [`AuthState`] so handlers that only need the id can use
/// `Extension<UserId>`.
///
/// [`AuthState`]: crate::extract::AuthState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);
