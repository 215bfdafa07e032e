use axum::{
    Json, Router,
    http::HeaderName,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod models;
pub mod repository;

// Read routes and guarded write routes.
pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

pub use auth::{AccessPolicy, AuthGate};
pub use config::AppConfig;
pub use error::{ApiError, DbError};
pub use hub::{HubApiClient, HubUser, IdentityState, MockIdentityProvider};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI description of the roster API, served as JSON at `<prefix>api` and through the
/// Swagger UI. Paths are relative to the API mount point.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_users, handlers::create_user, handlers::get_user, handlers::delete_user,
        handlers::list_groups, handlers::create_group, handlers::get_group, handlers::delete_group,
        handlers::list_images, handlers::create_image, handlers::get_image, handlers::delete_image,
    ),
    components(
        schemas(
            models::User, models::Group, models::Image,
            models::CreateUserRequest, models::CreateGroupRequest, models::CreateImageRequest,
        )
    ),
    tags(
        (name = "hub-roster", description = "JupyterHub resource roster API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything a handler may need, shared by all requests.
#[derive(Clone)]
pub struct AppState {
    /// Roster storage.
    pub repo: RepositoryState,
    /// Resolves callers against the hub.
    pub identity: IdentityState,
    pub config: AppConfig,
}

/// create_router
///
/// Builds the full application: the roster API nested at `<prefix>api`, the landing page at
/// `<prefix>`, API documentation and a health probe, wrapped in the tracing, request-id and
/// CORS layers.
pub fn create_router(state: AppState) -> Router {
    let prefix = state.config.service_prefix.clone();
    let mount = state.config.api_mount_path();

    // Writes require a hub admin, plus the configured group when there is one.
    let admin_policy = AccessPolicy::admin().with_group(state.config.admin_group.clone());
    let gate = AuthGate::new(state.identity.clone(), admin_policy);

    let mut openapi = ApiDoc::openapi();
    openapi.servers = Some(vec![utoipa::openapi::Server::new(mount.clone())]);

    let api_doc = openapi.clone();
    let api_router = admin::admin_routes(gate)
        .merge(public::public_routes())
        // GET <prefix>api describes the API it is mounted over.
        .route(
            "/",
            get(move || {
                let doc = api_doc.clone();
                async move { Json(doc) }
            }),
        );

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(
            SwaggerUi::new(format!("{prefix}swagger-ui"))
                .url(format!("{prefix}api-docs/openapi.json"), openapi),
        )
        .route("/health", get(|| async { "ok" }))
        .route(&prefix, get(handlers::index))
        .nest(&mount, api_router)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens one `http_request` span per request carrying the generated `x-request-id`, so every
/// log line of a request (including the audit lines) can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
