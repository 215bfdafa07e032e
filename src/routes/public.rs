use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Unauthenticated, read-only access to the roster. The spawner reads these endpoints to
/// decide what a starting server may use, so they carry no credential requirement.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /user, GET /user/{username}
        .route("/user", get(handlers::list_users))
        .route("/user/{username}", get(handlers::get_user))
        // GET /group, GET /group/{groupname}
        .route("/group", get(handlers::list_groups))
        .route("/group/{groupname}", get(handlers::get_group))
        // GET /image, GET /image/{id}
        .route("/image", get(handlers::list_images))
        .route("/image/{id}", get(handlers::get_image))
}
