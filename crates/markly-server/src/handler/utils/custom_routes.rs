//! Custom routes through which the business logic joins the pipeline.

use axum::Router;

use crate::service::ServiceState;

/// Route groups contributed by the business layer.
///
/// Each group is merged into the API router with the middleware of its
/// traffic class:
///
/// - private routes sit behind [`require_authentication`];
/// - public routes are reachable without a token;
/// - GraphQL routes use the GraphQL per-client limiter;
/// - authentication routes (login, registration) use the strictest
///   per-client limiter.
///
/// Every group gets [`authenticate`], so handlers can read `Option<AuthState>`.
///
/// ```rust,ignore
/// use axum::Router;
/// use axum::routing::post;
/// use markly_server::handler::CustomRoutes;
///
/// let custom = CustomRoutes::new()
///     .with_graphql_routes(Router::new().route("/graphql", post(graphql)))
///     .with_authentication_routes(Router::new().route("/auth/login", post(login)));
/// ```
///
/// [`require_authentication`]: crate::middleware::require_authentication
/// [`authenticate`]: crate::middleware::authenticate
#[derive(Debug, Default, Clone)]
pub struct CustomRoutes {
    /// Routes that require a verified identity.
    pub private_routes: Option<Router<ServiceState>>,
    /// Routes accessible without a token.
    pub public_routes: Option<Router<ServiceState>>,
    /// GraphQL endpoint routes.
    pub graphql_routes: Option<Router<ServiceState>>,
    /// Login and registration routes.
    pub authentication_routes: Option<Router<ServiceState>>,
}

fn merge_into(slot: &mut Option<Router<ServiceState>>, routes: Router<ServiceState>) {
    *slot = Some(match slot.take() {
        Some(existing) => existing.merge(routes),
        None => routes,
    });
}

impl CustomRoutes {
    /// Creates a new empty `CustomRoutes` instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the private routes.
    pub fn with_private_routes(mut self, routes: Router<ServiceState>) -> Self {
        self.private_routes = Some(routes);
        self
    }

    /// Sets the public routes.
    pub fn with_public_routes(mut self, routes: Router<ServiceState>) -> Self {
        self.public_routes = Some(routes);
        self
    }

    /// Sets the GraphQL routes.
    pub fn with_graphql_routes(mut self, routes: Router<ServiceState>) -> Self {
        self.graphql_routes = Some(routes);
        self
    }

    /// Sets the authentication routes.
    pub fn with_authentication_routes(mut self, routes: Router<ServiceState>) -> Self {
        self.authentication_routes = Some(routes);
        self
    }

    /// Adds private routes, merging with existing private routes if any.
    pub fn add_private_routes(mut self, routes: Router<ServiceState>) -> Self {
        merge_into(&mut self.private_routes, routes);
        self
    }

    /// Adds public routes, merging with existing public routes if any.
    pub fn add_public_routes(mut self, routes: Router<ServiceState>) -> Self {
        merge_into(&mut self.public_routes, routes);
        self
    }

    /// Returns true if no custom routes are configured.
    pub fn is_empty(&self) -> bool {
        self.private_routes.is_none()
            && self.public_routes.is_none()
            && self.graphql_routes.is_none()
            && self.authentication_routes.is_none()
    }

    /// Merges this `CustomRoutes` with another, combining all groups.
    pub fn merge(mut self, other: CustomRoutes) -> Self {
        let groups = [
            (&mut self.private_routes, other.private_routes),
            (&mut self.public_routes, other.public_routes),
            (&mut self.graphql_routes, other.graphql_routes),
            (&mut self.authentication_routes, other.authentication_routes),
        ];

        for (slot, routes) in groups {
            if let Some(routes) = routes {
                merge_into(slot, routes);
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;

    use super::*;

    fn router(path: &str) -> Router<ServiceState> {
        Router::new().route(path, get(|| async { "ok" }))
    }

    #[test]
    fn empty_by_default() {
        assert!(CustomRoutes::new().is_empty());
        assert!(!CustomRoutes::new().with_graphql_routes(router("/graphql")).is_empty());
    }

    #[test]
    fn merge_combines_groups() {
        let merged = CustomRoutes::new()
            .with_public_routes(router("/a"))
            .merge(
                CustomRoutes::new()
                    .with_public_routes(router("/b"))
                    .with_authentication_routes(router("/auth/login")),
            )
            .add_private_routes(router("/me"));

        assert!(merged.public_routes.is_some());
        assert!(merged.private_routes.is_some());
        assert!(merged.authentication_routes.is_some());
        assert!(merged.graphql_routes.is_none());
    }
}
