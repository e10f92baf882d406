//! Client route guards.
//!
//! A [`RouteGuard`] turns the current [`SessionState`] into a rendering
//! decision for one protected route. Role checks go through
//! [`autohaul_core::is_authorized`], the same predicate the API gates use.

use std::time::Duration;

use tokio::time::Instant;

use autohaul_core::{Role, is_authorized};

use crate::session::{SessionContext, SessionState};

/// Login page.
pub const LOGIN_PATH: &str = "/login";
/// Back-office landing page.
pub const ADMIN_HOME: &str = "/admin";
/// Client portal landing page.
pub const PORTAL_HOME: &str = "/portal";
/// Dead-end page for accounts without a role.
pub const NO_ROLE_PATH: &str = "/no-role";
/// Default target when a signed-in user may not see a route.
pub const UNAUTHORIZED_PATH: &str = "/";

/// Which signed-in users a route admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Anyone with a recognised role.
    AnyRole,
    /// Only the listed roles.
    OneOf(Vec<Role>),
}

/// What to do with a navigation to a guarded route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still hydrating; show a placeholder, do not navigate.
    Interstitial,
    /// Navigate elsewhere. `return_to` carries the requested location when
    /// sending the user to sign in.
    Redirect {
        to: String,
        return_to: Option<String>,
    },
    /// Signed in, but the account has no role. Show the "contact an
    /// administrator" page in place.
    NoRole,
    /// Show the route.
    Render,
}

/// Guard for one protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    pub access: Access,
    /// Where unauthenticated users go.
    pub redirect_to: String,
    /// Where signed-in users without access go.
    pub unauthorized_to: String,
}

impl RouteGuard {
    /// Guard admitting any user with a recognised role.
    #[must_use]
    pub fn any_role() -> Self {
        Self::new(Access::AnyRole)
    }

    /// Guard admitting only `roles`.
    #[must_use]
    pub fn one_of(roles: &[Role]) -> Self {
        Self::new(Access::OneOf(roles.to_vec()))
    }

    /// Guard for back-office routes.
    #[must_use]
    pub fn staff() -> Self {
        Self::one_of(&Role::STAFF)
    }

    /// Guard for client portal routes.
    #[must_use]
    pub fn client() -> Self {
        Self::one_of(&[Role::Client])
    }

    fn new(access: Access) -> Self {
        Self {
            access,
            redirect_to: LOGIN_PATH.to_string(),
            unauthorized_to: UNAUTHORIZED_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    #[must_use]
    pub fn unauthorized_to(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_to = path.into();
        self
    }

    /// Decide what to do with a navigation to `requested`.
    #[must_use]
    pub fn evaluate(&self, state: &SessionState, requested: &str) -> GuardDecision {
        match state {
            SessionState::Loading | SessionState::RoleLoading(_) => GuardDecision::Interstitial,
            SessionState::Unauthenticated => GuardDecision::Redirect {
                to: self.redirect_to.clone(),
                return_to: Some(requested.to_string()),
            },
            SessionState::Authenticated { role, .. } => match &self.access {
                Access::AnyRole if role.is_set() => GuardDecision::Render,
                Access::AnyRole => GuardDecision::NoRole,
                Access::OneOf(allowed) if is_authorized(*role, allowed) => GuardDecision::Render,
                Access::OneOf(_) => GuardDecision::Redirect {
                    to: self.unauthorized_to.clone(),
                    return_to: None,
                },
            },
        }
    }
}

/// Landing page for a signed-in role.
#[must_use]
pub const fn home_for(role: Role) -> &'static str {
    match role {
        Role::Admin | Role::Employee => ADMIN_HOME,
        Role::Client => PORTAL_HOME,
        Role::Unset => NO_ROLE_PATH,
    }
}

/// Outcome of one post-login check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostLoginDecision {
    /// Keep waiting for the session to settle.
    Wait,
    /// Navigate now.
    Redirect(String),
}

/// Bounded wait on the page shown right after sign-in.
///
/// Sends the user to their role's landing page once the session settles.
/// If a user is known but the role is still loading after `timeout`, it
/// gives up and sends them to `fallback` instead of waiting forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLoginRedirect {
    pub timeout: Duration,
    pub fallback: String,
}

impl PostLoginRedirect {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            fallback: PORTAL_HOME.to_string(),
        }
    }

    #[must_use]
    pub fn fallback(mut self, path: impl Into<String>) -> Self {
        self.fallback = path.into();
        self
    }

    /// Decide, given the state and time since the page mounted.
    #[must_use]
    pub fn decide(&self, state: &SessionState, elapsed: Duration) -> PostLoginDecision {
        match state {
            SessionState::Authenticated { role, .. } => {
                PostLoginDecision::Redirect(home_for(*role).to_string())
            }
            SessionState::Unauthenticated => PostLoginDecision::Redirect(LOGIN_PATH.to_string()),
            SessionState::RoleLoading(_) if elapsed >= self.timeout => {
                PostLoginDecision::Redirect(self.fallback.clone())
            }
            SessionState::RoleLoading(_) | SessionState::Loading => PostLoginDecision::Wait,
        }
    }

    /// Wait for a destination.
    ///
    /// Never waits past `timeout` once a user is known.
    pub async fn wait(&self, ctx: &SessionContext) -> String {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut rx = ctx.subscribe();

        loop {
            let state = rx.borrow_and_update().clone();
            if let PostLoginDecision::Redirect(to) = self.decide(&state, started.elapsed()) {
                return to;
            }

            let changed = if state.user().is_some() {
                tokio::select! {
                    changed = rx.changed() => changed,
                    () = tokio::time::sleep_until(deadline) => Ok(()),
                }
            } else {
                rx.changed().await
            };

            if changed.is_err() {
                // Context dropped; decide on what was last seen.
                tracing::debug!("Session context closed during post-login wait");
                let state = rx.borrow().clone();
                return match self.decide(&state, self.timeout) {
                    PostLoginDecision::Redirect(to) => to,
                    PostLoginDecision::Wait => LOGIN_PATH.to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use autohaul_core::UserId;

    use super::*;
    use crate::sdk::{MemorySdk, User};

    fn user() -> User {
        User {
            id: UserId::random(),
            email: Some("someone@example.com".to_string()),
            phone: None,
            user_metadata: serde_json::Value::Null,
        }
    }

    fn signed_in(role: Role) -> SessionState {
        SessionState::Authenticated { user: user(), role }
    }

    #[test]
    fn test_loading_states_show_interstitial() {
        let guard = RouteGuard::staff();
        assert_eq!(
            guard.evaluate(&SessionState::Loading, "/admin"),
            GuardDecision::Interstitial
        );
        assert_eq!(
            guard.evaluate(&SessionState::RoleLoading(user()), "/admin"),
            GuardDecision::Interstitial
        );
    }

    #[test]
    fn test_unauthenticated_redirects_to_login_with_return() {
        let guard = RouteGuard::client().redirect_to("/sign-in");
        assert_eq!(
            guard.evaluate(&SessionState::Unauthenticated, "/portal/shipments"),
            GuardDecision::Redirect {
                to: "/sign-in".to_string(),
                return_to: Some("/portal/shipments".to_string()),
            }
        );
    }

    #[test]
    fn test_employee_renders_staff_route() {
        let guard = RouteGuard::one_of(&[Role::Admin, Role::Employee]);
        assert_eq!(
            guard.evaluate(&signed_in(Role::Employee), "/admin"),
            GuardDecision::Render
        );
    }

    #[test]
    fn test_unset_role_on_client_route_goes_to_unauthorized() {
        let guard = RouteGuard::one_of(&[Role::Client])
            .redirect_to("/login")
            .unauthorized_to("/unauthorized");
        assert_eq!(
            guard.evaluate(&signed_in(Role::Unset), "/portal"),
            GuardDecision::Redirect {
                to: "/unauthorized".to_string(),
                return_to: None,
            }
        );
    }

    #[test]
    fn test_client_on_staff_route_goes_to_unauthorized() {
        let guard = RouteGuard::staff();
        assert_eq!(
            guard.evaluate(&signed_in(Role::Client), "/admin"),
            GuardDecision::Redirect {
                to: UNAUTHORIZED_PATH.to_string(),
                return_to: None,
            }
        );
    }

    #[test]
    fn test_any_role_guard() {
        let guard = RouteGuard::any_role();
        assert_eq!(
            guard.evaluate(&signed_in(Role::Unset), "/account"),
            GuardDecision::NoRole
        );
        for role in Role::RECOGNISED {
            assert_eq!(
                guard.evaluate(&signed_in(role), "/account"),
                GuardDecision::Render
            );
        }
    }

    #[test]
    fn test_role_landing_pages() {
        assert_eq!(home_for(Role::Admin), "/admin");
        assert_eq!(home_for(Role::Employee), "/admin");
        assert_eq!(home_for(Role::Client), "/portal");
        assert_eq!(home_for(Role::Unset), "/no-role");
    }

    #[test]
    fn test_post_login_decide() {
        let page = PostLoginRedirect::new(Duration::from_secs(4));

        assert_eq!(
            page.decide(&SessionState::Loading, Duration::from_secs(60)),
            PostLoginDecision::Wait
        );
        assert_eq!(
            page.decide(&SessionState::RoleLoading(user()), Duration::from_secs(1)),
            PostLoginDecision::Wait
        );
        assert_eq!(
            page.decide(&SessionState::RoleLoading(user()), Duration::from_secs(4)),
            PostLoginDecision::Redirect("/portal".to_string())
        );
        assert_eq!(
            page.decide(&signed_in(Role::Admin), Duration::ZERO),
            PostLoginDecision::Redirect("/admin".to_string())
        );
        assert_eq!(
            page.decide(&SessionState::Unauthenticated, Duration::ZERO),
            PostLoginDecision::Redirect("/login".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_login_wait_times_out_on_stuck_role() {
        let sdk = MemorySdk::new();
        sdk.add_account("ops@example.com", "pw", Some("employee")).await;
        sdk.restore_session("ops@example.com").await;
        sdk.delay_role_lookups(Duration::from_secs(60));

        let ctx = SessionContext::mount(Arc::new(sdk));
        let page = PostLoginRedirect::new(Duration::from_secs(4)).fallback("/dashboard");

        let started = Instant::now();
        let to = page.wait(&ctx).await;

        assert_eq!(to, "/dashboard");
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_login_wait_follows_settled_role() {
        let sdk = MemorySdk::new();
        sdk.add_account("ops@example.com", "pw", Some("admin")).await;
        sdk.restore_session("ops@example.com").await;
        sdk.delay_role_lookups(Duration::from_secs(1));

        let ctx = SessionContext::mount(Arc::new(sdk));
        let to = PostLoginRedirect::new(Duration::from_secs(4)).wait(&ctx).await;

        assert_eq!(to, "/admin");
    }
}
