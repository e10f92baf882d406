//! Per-request identity resolution from a bearer token.
//!
//! Resolution never fails: every problem collapses into a less-privileged
//! result. No token or a rejected token gives an anonymous identity; a
//! verified user whose profile cannot be read gets [`Role::Unset`].

use std::sync::Arc;

use axum::http::{HeaderMap, header::AUTHORIZATION};

use autohaul_core::Role;

use crate::backend::{BackendError, IdentityProvider};
use crate::models::{AuthContext, User};

/// Outcome of resolving a request's identity.
#[derive(Debug, Clone, Default)]
pub struct ResolvedIdentity {
    /// The verified caller, if any.
    pub user: Option<User>,
    /// The caller's role; `Unset` when there is no user or no readable profile.
    pub role: Role,
}

impl ResolvedIdentity {
    /// An identity with no user and no role.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Convert into a request context, if a user was resolved.
    #[must_use]
    pub fn into_context(self) -> Option<AuthContext> {
        let role = self.role;
        self.user.map(|user| AuthContext { user, role })
    }
}

/// Resolves bearer tokens into users and profile roles.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityResolver {
    /// Create a resolver backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Resolve the identity behind a request's `Authorization` header.
    pub async fn resolve(&self, headers: &HeaderMap) -> ResolvedIdentity {
        let has_auth_header = headers.contains_key(AUTHORIZATION);
        let Some(token) = bearer_token(headers) else {
            tracing::debug!(has_auth_header, "No bearer token on request");
            return ResolvedIdentity::anonymous();
        };
        let token_len = token.len();

        let user = match self.provider.user_for_token(token).await {
            Ok(user) => user,
            Err(BackendError::Unauthorized) => {
                tracing::debug!(token_len, "Bearer token rejected");
                return ResolvedIdentity::anonymous();
            }
            Err(e) => {
                tracing::warn!(token_len, error = %e, "Token validation failed");
                return ResolvedIdentity::anonymous();
            }
        };

        let role = match self.provider.profile_role(user.id).await {
            Ok(raw) => {
                let role = Role::from_profile(raw.as_deref());
                if !role.is_set() && raw.as_deref().is_some_and(|r| !r.trim().is_empty()) {
                    tracing::warn!(user_id = %user.id, raw_role = ?raw, "Unrecognised profile role");
                }
                role
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "Profile lookup failed, no role granted"
                );
                Role::Unset
            }
        };

        tracing::debug!(user_id = %user.id, role = %role, token_len, "Identity resolved");

        ResolvedIdentity {
            user: Some(user),
            role,
        }
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively; blank tokens are ignored.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
