use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use hub_roster::hub::{CredentialKind, HubApiClient, IdentityProvider};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

// --- Fake Hub ---

const SERVICE_TOKEN: &str = "svc-secret";

/// Records the raw credential path segment the client asked about.
#[derive(Clone, Default)]
struct FakeHub {
    seen: Arc<Mutex<Vec<String>>>,
}

async fn token_lookup(
    State(hub): State<FakeHub>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> impl IntoResponse {
    hub.seen.lock().unwrap().push(token.clone());

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(&format!("token {SERVICE_TOKEN}"));
    if !authorized {
        return (StatusCode::FORBIDDEN, "{}".to_string()).into_response();
    }

    match token.as_str() {
        // Served as text/plain on purpose: the client must not trust the content type.
        "good" => (
            StatusCode::OK,
            r#"{"name":"ada","admin":true,"groups":["staff"],"kind":"user"}"#.to_string(),
        )
            .into_response(),
        "a/b c" => (StatusCode::OK, r#"{"name":"slashy"}"#.to_string()).into_response(),
        "garbage" => (StatusCode::OK, "<html>oops</html>".to_string()).into_response(),
        "empty" => (StatusCode::OK, "{}".to_string()).into_response(),
        _ => (StatusCode::NOT_FOUND, r#"{"status":404,"message":"Not Found"}"#.to_string())
            .into_response(),
    }
}

async fn cookie_lookup(Path(cookie): Path<String>) -> impl IntoResponse {
    if cookie == "session" {
        (StatusCode::OK, r#"{"name":"cookie-user","admin":false}"#).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn spawn_hub() -> (String, FakeHub) {
    let hub = FakeHub::default();
    let router = Router::new()
        .route("/hub/api/authorizations/token/{token}", get(token_lookup))
        .route(
            "/hub/api/authorizations/cookie/jupyterhub-services/{cookie}",
            get(cookie_lookup),
        )
        .with_state(hub.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}/hub/api"), hub)
}

// --- Tests ---

#[tokio::test]
async fn test_token_resolves_to_hub_user() {
    let (base, _) = spawn_hub().await;
    let client = HubApiClient::new(&base, SERVICE_TOKEN).unwrap();

    let user = client.resolve("good", CredentialKind::Token).await.unwrap();
    assert_eq!(user.name, "ada");
    assert!(user.admin);
    assert!(user.in_group("staff"));
}

#[tokio::test]
async fn test_cookie_uses_the_services_cookie_endpoint() {
    let (base, _) = spawn_hub().await;
    let client = HubApiClient::new(&base, SERVICE_TOKEN).unwrap();

    let user = client.resolve("session", CredentialKind::Cookie).await.unwrap();
    assert_eq!(user.name, "cookie-user");
    assert!(!user.admin);
    assert!(client.resolve("session", CredentialKind::Token).await.is_none());
}

#[tokio::test]
async fn test_credential_travels_as_one_encoded_segment() {
    let (base, hub) = spawn_hub().await;
    let client = HubApiClient::new(&base, SERVICE_TOKEN).unwrap();

    let user = client.resolve("a/b c", CredentialKind::Token).await.unwrap();
    assert_eq!(user.name, "slashy");
    assert_eq!(hub.seen.lock().unwrap().as_slice(), ["a/b c".to_string()]);
}

#[tokio::test]
async fn test_failures_resolve_to_no_identity() {
    let (base, _) = spawn_hub().await;
    let client = HubApiClient::new(&base, SERVICE_TOKEN).unwrap();

    for token in ["unknown", "garbage", "empty"] {
        assert!(
            client.resolve(token, CredentialKind::Token).await.is_none(),
            "{token} should not resolve"
        );
    }

    let wrong_service = HubApiClient::new(&base, "not-the-token").unwrap();
    assert!(wrong_service.resolve("good", CredentialKind::Token).await.is_none());
}

#[tokio::test]
async fn test_unreachable_hub_is_no_identity() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = HubApiClient::new(&format!("http://127.0.0.1:{port}/hub/api"), SERVICE_TOKEN).unwrap();
    assert!(client.resolve("good", CredentialKind::Token).await.is_none());
}

#[tokio::test]
async fn test_each_resolve_is_a_fresh_lookup() {
    let (base, hub) = spawn_hub().await;
    let client = HubApiClient::new(&base, SERVICE_TOKEN).unwrap();

    client.resolve("good", CredentialKind::Token).await.unwrap();
    client.resolve("good", CredentialKind::Token).await.unwrap();
    assert_eq!(hub.seen.lock().unwrap().len(), 2);
}
