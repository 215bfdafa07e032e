use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Name of the session cookie the hub sets for its services.
pub const SERVICES_COOKIE: &str = "jupyterhub-services";

/// HubUser
///
/// The identity the hub reports for a credential. Only the fields the access policy needs are
/// kept. A missing or `null` `admin` means "not an admin", and missing `groups` means none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubUser {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub admin: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: BTreeSet<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl HubUser {
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

/// CredentialKind
///
/// Where a credential came from, which decides the hub endpoint used to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Cookie,
    Token,
}

impl CredentialKind {
    /// Hub API path for a credential. The credential is fully percent-encoded so it stays a
    /// single path segment.
    pub fn endpoint(&self, credential: &str) -> String {
        let encoded = urlencoding::encode(credential);
        match self {
            CredentialKind::Cookie => {
                format!("authorizations/cookie/{SERVICES_COOKIE}/{encoded}")
            }
            CredentialKind::Token => format!("authorizations/token/{encoded}"),
        }
    }
}

/// IdentityProvider
///
/// Resolves a credential to a hub identity. `None` covers every way of not getting one:
/// unknown credential, hub unreachable, or an unusable answer.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, credential: &str, kind: CredentialKind) -> Option<HubUser>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

#[derive(Error, Debug)]
enum LookupError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("hub answered {0}")]
    Status(StatusCode),
    #[error("response is not a user record: {0}")]
    Body(#[from] serde_json::Error),
    #[error("user record has an empty name")]
    Anonymous,
}

/// HubApiClient
///
/// `IdentityProvider` backed by the JupyterHub REST API. Each call is a fresh lookup; the
/// underlying `reqwest::Client` only pools connections.
#[derive(Clone)]
pub struct HubApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HubApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn endpoint_url(&self, credential: &str, kind: CredentialKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint(credential))
    }

    async fn lookup(&self, url: &str) -> Result<HubUser, LookupError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status));
        }

        // The hub does not always label this response as JSON, so parse the raw text.
        let body = response.text().await?;
        let user: HubUser = serde_json::from_str(&body)?;
        if user.name.is_empty() {
            return Err(LookupError::Anonymous);
        }
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for HubApiClient {
    async fn resolve(&self, credential: &str, kind: CredentialKind) -> Option<HubUser> {
        let url = self.endpoint_url(credential, kind);
        match self.lookup(&url).await {
            Ok(user) => {
                tracing::debug!(user = %user.name, admin = user.admin, ?kind, "resolved hub identity");
                Some(user)
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "hub identity lookup failed");
                None
            }
        }
    }
}

/// MockIdentityProvider
///
/// In-memory `IdentityProvider` for tests. Answers from a fixed credential table and counts
/// every lookup so tests can assert when the hub was (or was not) consulted.
#[derive(Default)]
pub struct MockIdentityProvider {
    users: HashMap<(CredentialKind, String), HubUser>,
    lookups: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, cookie: &str, user: HubUser) -> Self {
        self.users
            .insert((CredentialKind::Cookie, cookie.to_string()), user);
        self
    }

    pub fn with_token(mut self, token: &str, user: HubUser) -> Self {
        self.users.insert((CredentialKind::Token, token.to_string()), user);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn resolve(&self, credential: &str, kind: CredentialKind) -> Option<HubUser> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users.get(&(kind, credential.to_string())).cloned()
    }
}
