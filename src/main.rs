use hub_roster::{
    AppState, HubApiClient, IdentityState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects and migrates the database, then serves the
/// roster API until the process is stopped.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load().expect("FATAL: invalid configuration");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hub_roster=debug,tower_http=info".into());

    // Pretty output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL or DB_* settings.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    let hub = HubApiClient::new(&config.hub_api_url, &config.hub_api_token)
        .expect("FATAL: Failed to build the JupyterHub API client.");
    let identity = Arc::new(hub) as IdentityState;

    if let Some(group) = &config.admin_group {
        tracing::info!("Write access limited to admins in group `{}`", group);
    }

    let port = config.port;
    let mount = config.api_mount_path();

    let app = create_router(AppState {
        repo,
        identity,
        config,
    });

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("FATAL: Failed to bind the listen port.");

    tracing::info!("Listening on 0.0.0.0:{}", port);
    tracing::info!("Roster API mounted at {}", mount);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
