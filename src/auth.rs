use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    hub::{CredentialKind, HubUser, IdentityState, SERVICES_COOKIE},
};

/// Header carrying a hub API token when no services cookie is present.
pub const TOKEN_HEADER: &str = "token";

/// AccessPolicy
///
/// What a resolved caller must satisfy before a guarded handler runs. The policy is fixed
/// when the route is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Hub group the caller must belong to.
    pub required_group: Option<String>,
    /// Whether the caller must be a hub administrator.
    pub require_admin: bool,
}

impl AccessPolicy {
    /// Any identified caller.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn admin() -> Self {
        Self {
            required_group: None,
            require_admin: true,
        }
    }

    pub fn group(group: impl Into<String>) -> Self {
        Self {
            required_group: Some(group.into()),
            require_admin: false,
        }
    }

    /// Adds (or clears) the group requirement, keeping the admin requirement as is.
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.required_group = group.filter(|g| !g.is_empty());
        self
    }

    /// check
    ///
    /// Evaluates the policy against a resolved caller. Rejections name the unmet condition.
    pub fn check(&self, user: &HubUser) -> Result<(), ApiError> {
        match (self.require_admin, self.required_group.as_deref()) {
            (true, Some(group)) => {
                if user.admin && user.in_group(group) {
                    Ok(())
                } else {
                    Err(ApiError::AuthorizationDenied(format!(
                        "Not an administrator or not in group `{group}`"
                    )))
                }
            }
            (true, None) => {
                if user.admin {
                    Ok(())
                } else {
                    Err(ApiError::AuthorizationDenied(
                        "Not an administrator".to_string(),
                    ))
                }
            }
            (false, Some(group)) => {
                if user.in_group(group) {
                    Ok(())
                } else {
                    Err(ApiError::AuthorizationDenied(format!(
                        "Not part of group `{group}`"
                    )))
                }
            }
            (false, None) => Ok(()),
        }
    }
}

/// AuthGate
///
/// State for the `auth_gate` middleware: where to resolve credentials and which policy to
/// enforce. One gate is built per distinct policy at router assembly.
#[derive(Clone)]
pub struct AuthGate {
    identity: IdentityState,
    policy: Arc<AccessPolicy>,
}

impl AuthGate {
    pub fn new(identity: IdentityState, policy: AccessPolicy) -> Self {
        Self {
            identity,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

/// extract_credential
///
/// The services cookie takes precedence; the `token` header is the fallback. Empty values
/// count as absent.
pub fn extract_credential(headers: &HeaderMap) -> Option<(String, CredentialKind)> {
    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SERVICES_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty());

    if let Some(cookie) = cookie {
        return Some((cookie.to_string(), CredentialKind::Cookie));
    }

    headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|token| (token.to_string(), CredentialKind::Token))
}

/// auth_gate
///
/// Middleware guarding a route with the gate's `AccessPolicy`.
///
/// Resolves the caller through the hub on every request (nothing is cached), stores the
/// `HubUser` in the request extensions for the handler's audit logging, and only then lets
/// the request through. A rejected request never reaches the handler.
pub async fn auth_gate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (credential, kind) =
        extract_credential(request.headers()).ok_or(ApiError::AuthenticationMissing)?;

    let user = gate
        .identity
        .resolve(&credential, kind)
        .await
        .ok_or(ApiError::AuthenticationMissing)?;

    gate.policy.check(&user)?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
