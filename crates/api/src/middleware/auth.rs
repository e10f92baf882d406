//! Authorization gates and the identity extractor.
//!
//! Gates are plain axum middleware functions, applied per route with
//! `route_layer`. `require_auth` resolves the caller and attaches an
//! [`AuthContext`] to the request; the role gates read that context and
//! must therefore sit inside it:
//!
//! ```rust,ignore
//! get(list_shipments)
//!     .route_layer(from_fn_with_state(STAFF, require_one_of))
//!     .route_layer(from_fn_with_state(state.clone(), require_auth))
//! ```
//!
//! Every decision goes through [`check_access`].

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::Span;

use autohaul_core::{Role, admits_client, is_authorized};

use crate::error::set_sentry_user;
use crate::models::AuthContext;
use crate::state::AppState;

/// What a route requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    /// Any verified identity.
    Authenticated,
    /// A verified identity whose role is in the allow-list.
    OneOf(&'a [Role]),
    /// A verified identity that is not staff, including one with no role.
    Client,
}

/// Why a gate stopped a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// No verifiable identity (401).
    Unauthenticated,
    /// Identity verified but not permitted (403).
    Forbidden,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Insufficient permissions" })),
            )
                .into_response(),
        }
    }
}

/// The single access decision shared by every gate.
///
/// # Errors
///
/// Returns [`GateRejection::Unauthenticated`] when there is no identity and
/// [`GateRejection::Forbidden`] when the identity's role does not qualify.
pub fn check_access(ctx: Option<&AuthContext>, access: Access<'_>) -> Result<(), GateRejection> {
    let Some(ctx) = ctx else {
        return Err(GateRejection::Unauthenticated);
    };

    let admitted = match access {
        Access::Authenticated => true,
        Access::OneOf(allowed) => is_authorized(ctx.role, allowed),
        Access::Client => admits_client(ctx.role),
    };

    if admitted {
        Ok(())
    } else {
        tracing::debug!(user_id = %ctx.user.id, role = %ctx.role, ?access, "Access denied");
        Err(GateRejection::Forbidden)
    }
}

/// Resolve the caller and attach their [`AuthContext`], or respond 401.
///
/// # Errors
///
/// Returns [`GateRejection::Unauthenticated`] when no user can be resolved.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let ctx = state
        .identity()
        .resolve(request.headers())
        .await
        .into_context();
    check_access(ctx.as_ref(), Access::Authenticated)?;
    let ctx = ctx.ok_or(GateRejection::Unauthenticated)?;

    Span::current().record("role", tracing::field::display(ctx.role));
    set_sentry_user(ctx.user.id, ctx.user.email.as_deref());

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Admit only callers holding exactly `role`. Runs inside [`require_auth`].
///
/// # Errors
///
/// 401 without an attached identity, 403 on a role mismatch.
pub async fn require_role(
    State(role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    check_access(request.extensions().get(), Access::OneOf(&[role]))?;
    Ok(next.run(request).await)
}

/// Admit callers whose role is in `allowed`. Runs inside [`require_auth`].
///
/// # Errors
///
/// 401 without an attached identity, 403 when the role is not listed.
pub async fn require_one_of(
    State(allowed): State<&'static [Role]>,
    request: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    check_access(request.extensions().get(), Access::OneOf(allowed))?;
    Ok(next.run(request).await)
}

/// Admit any non-staff caller. Runs inside [`require_auth`].
///
/// # Errors
///
/// 401 without an attached identity, 403 for admin and employee callers.
pub async fn require_client(request: Request, next: Next) -> Result<Response, GateRejection> {
    check_access(request.extensions().get(), Access::Client)?;
    Ok(next.run(request).await)
}

/// Extractor for the identity attached by [`require_auth`].
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentIdentity(ctx): CurrentIdentity) -> impl IntoResponse {
///     format!("Hello, {}!", ctx.user.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(Self)
            .ok_or(GateRejection::Unauthenticated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, body::Body, middleware::from_fn_with_state, routing::get};
    use tower::ServiceExt;

    use autohaul_core::UserId;

    use super::*;
    use crate::models::User;

    fn ctx(role: Role) -> AuthContext {
        AuthContext {
            user: User {
                id: UserId::random(),
                email: Some("someone@example.com".to_string()),
                user_metadata: serde_json::Value::Null,
            },
            role,
        }
    }

    #[test]
    fn test_missing_identity_is_unauthenticated_for_every_gate() {
        for access in [
            Access::Authenticated,
            Access::OneOf(&Role::STAFF),
            Access::Client,
        ] {
            assert_eq!(
                check_access(None, access),
                Err(GateRejection::Unauthenticated)
            );
        }
    }

    #[test]
    fn test_allow_list() {
        assert!(check_access(Some(&ctx(Role::Admin)), Access::OneOf(&Role::STAFF)).is_ok());
        assert!(check_access(Some(&ctx(Role::Employee)), Access::OneOf(&Role::STAFF)).is_ok());
        assert_eq!(
            check_access(Some(&ctx(Role::Client)), Access::OneOf(&Role::STAFF)),
            Err(GateRejection::Forbidden)
        );
        assert_eq!(
            check_access(Some(&ctx(Role::Unset)), Access::OneOf(&[Role::Client])),
            Err(GateRejection::Forbidden)
        );
    }

    #[test]
    fn test_client_gate_is_a_deny_list() {
        assert!(check_access(Some(&ctx(Role::Unset)), Access::Client).is_ok());
        assert!(check_access(Some(&ctx(Role::Client)), Access::Client).is_ok());
        assert_eq!(
            check_access(Some(&ctx(Role::Admin)), Access::Client),
            Err(GateRejection::Forbidden)
        );
        assert_eq!(
            check_access(Some(&ctx(Role::Employee)), Access::Client),
            Err(GateRejection::Forbidden)
        );
    }

    #[test]
    fn test_any_identity_passes_authenticated() {
        assert!(check_access(Some(&ctx(Role::Unset)), Access::Authenticated).is_ok());
    }

    #[tokio::test]
    async fn test_rejection_bodies() {
        let response = GateRejection::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Insufficient permissions" }));
    }

    async fn attach(State(role): State<Role>, mut request: Request, next: Next) -> Response {
        request.extensions_mut().insert(ctx(role));
        next.run(request).await
    }

    async fn admin_only(caller: Option<Role>) -> StatusCode {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route_layer(from_fn_with_state(Role::Admin, require_role));
        let router = match caller {
            Some(role) => router.layer(from_fn_with_state(role, attach)),
            None => router,
        };
        router
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_require_role_matches_exactly() {
        assert_eq!(admin_only(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(admin_only(Some(Role::Admin)).await, StatusCode::OK);
        assert_eq!(admin_only(Some(Role::Employee)).await, StatusCode::FORBIDDEN);
        assert_eq!(admin_only(Some(Role::Unset)).await, StatusCode::FORBIDDEN);
    }
}
