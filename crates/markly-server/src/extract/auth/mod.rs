//! Authentication extractors.
//!
//! - [`AuthClaims`] - identity token claims
//! - [`AuthState`] - verified claims of the current request
//! - [`Identity`] - the authenticated caller

mod auth_claims;
mod auth_state;
mod identity;

pub use self::auth_claims::AuthClaims;
pub use self::auth_state::{AuthState, current_identity};
pub use self::identity::{Identity, UserId};
