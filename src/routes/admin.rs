use crate::{
    AppState,
    auth::{AuthGate, auth_gate},
    handlers,
};
use axum::{
    Router, middleware,
    routing::{delete, post},
};

/// Admin Router Module
///
/// Every route that changes the roster. The whole router sits behind `auth_gate` configured
/// with `gate`, so handlers can rely on an `Extension<HubUser>` being present and only have
/// to log who acted.
pub fn admin_routes(gate: AuthGate) -> Router<AppState> {
    Router::new()
        .route("/user", post(handlers::create_user))
        .route("/user/{username}", delete(handlers::delete_user))
        .route("/group", post(handlers::create_group))
        .route("/group/{groupname}", delete(handlers::delete_group))
        .route("/image", post(handlers::create_image))
        .route("/image/{id}", delete(handlers::delete_image))
        // route_layer: unmatched paths still 404 instead of demanding credentials.
        .route_layer(middleware::from_fn_with_state(gate, auth_gate))
}
