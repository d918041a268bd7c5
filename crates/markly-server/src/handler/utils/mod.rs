//! [`CustomRoutes`] and other utilities.

mod custom_routes;

pub use crate::handler::utils::custom_routes::CustomRoutes;
