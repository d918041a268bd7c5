//! Response types for HTTP handlers.

mod errors;
mod sessions;

pub use errors::*;
pub use sessions::*;
