//! Client session context.
//!
//! Holds the signed-in user and their role for the lifetime of the client,
//! published through a `watch` channel so every view sees the same state.
//!
//! ```text
//!            mount / auth event / refresh_auth
//!  Loading ──────────────┬─────────────────────────► Unauthenticated
//!                        │ user known
//!                        ▼
//!                   RoleLoading(user) ──role lookup──► Authenticated { user, role }
//! ```
//!
//! The auth event stream is not guaranteed to be delivered before the
//! caller's next navigation decision, so sign-in goes through
//! [`SessionContext::sign_in`], which refreshes and returns the settled
//! state before the caller navigates.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;

use autohaul_core::Role;

use crate::sdk::{AuthEvent, IdentitySdk, SdkError, User};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Nothing known yet.
    #[default]
    Loading,
    /// The user is known; their role is being fetched.
    RoleLoading(User),
    /// Fully resolved.
    Authenticated { user: User, role: Role },
    /// No signed-in user.
    Unauthenticated,
}

impl SessionState {
    /// Whether a refresh cycle is still in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading | Self::RoleLoading(_))
    }

    /// The known user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::RoleLoading(user) | Self::Authenticated { user, .. } => Some(user),
            Self::Loading | Self::Unauthenticated => None,
        }
    }

    /// The resolved role, once authenticated.
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Authenticated { role, .. } => Some(*role),
            _ => None,
        }
    }
}

/// Reactive session store bound to one SDK instance.
///
/// Dropping the context stops its event listener.
pub struct SessionContext {
    inner: Arc<SessionInner>,
    listener: JoinHandle<()>,
}

struct SessionInner {
    sdk: Arc<dyn IdentitySdk>,
    state: watch::Sender<SessionState>,
    /// Serializes refreshes so a stale one never overwrites a newer one.
    refresh: Mutex<()>,
}

impl SessionContext {
    /// Start the context: hydrate once, then follow auth events until
    /// dropped.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn mount(sdk: Arc<dyn IdentitySdk>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        // Subscribe before hydrating so no event between the two is lost.
        let events = sdk.subscribe();
        let inner = Arc::new(SessionInner {
            sdk,
            state,
            refresh: Mutex::new(()),
        });

        let listener = tokio::spawn(listen(Arc::clone(&inner), events));

        Self { inner, listener }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// A receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The SDK this context is bound to.
    #[must_use]
    pub fn sdk(&self) -> &Arc<dyn IdentitySdk> {
        &self.inner.sdk
    }

    /// Re-derive user and role now and return the settled state.
    pub async fn refresh_auth(&self) -> SessionState {
        self.inner.refresh().await
    }

    /// Re-fetch the role of the current user, e.g. after an admin changed
    /// it. Equivalent to [`Self::refresh_auth`] when nobody is signed in.
    pub async fn refresh_profile(&self) -> SessionState {
        let guard = self.inner.refresh.lock().await;
        let Some(user) = self.state().user().cloned() else {
            drop(guard);
            return self.inner.refresh().await;
        };
        let role = self.inner.resolve_role(&user).await;
        let state = self.inner.publish(SessionState::Authenticated { user, role });
        drop(guard);
        state
    }

    /// Sign in, then refresh, so the returned state already reflects the
    /// new session.
    ///
    /// # Errors
    ///
    /// Returns the SDK's sign-in error; the state is left unchanged.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
        captcha_token: Option<&str>,
    ) -> Result<SessionState, SdkError> {
        self.inner
            .sdk
            .sign_in_with_password(email, password, captcha_token)
            .await?;
        Ok(self.refresh_auth().await)
    }

    /// Sign out, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the SDK's sign-out error after the state has been refreshed.
    pub async fn sign_out(&self) -> Result<SessionState, SdkError> {
        let result = self.inner.sdk.sign_out().await;
        let state = self.refresh_auth().await;
        result.map(|()| state)
    }

    /// Wait until no refresh is in flight, up to `timeout`.
    ///
    /// Returns the last observed state either way.
    pub async fn settled(&self, timeout: Duration) -> SessionState {
        let mut rx = self.subscribe();
        let wait = rx.wait_for(|state| !state.is_loading());
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => state.clone(),
            _ => self.state(),
        }
    }

    /// Stop following auth events.
    pub fn unmount(self) {
        // Drop does the work.
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    async fn refresh(&self) -> SessionState {
        let _guard = self.refresh.lock().await;

        let user = match self.sdk.current_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load current user");
                None
            }
        };

        let Some(user) = user else {
            return self.publish(SessionState::Unauthenticated);
        };

        // Keep an already-resolved session on screen while re-checking it.
        let already_shown = matches!(
            &*self.state.borrow(),
            SessionState::Authenticated { user: shown, .. } if shown.id == user.id
        );
        if !already_shown {
            self.publish(SessionState::RoleLoading(user.clone()));
        }

        let role = self.resolve_role(&user).await;
        self.publish(SessionState::Authenticated { user, role })
    }

    async fn resolve_role(&self, user: &User) -> Role {
        match self.sdk.fetch_role(user.id).await {
            Ok(raw) => {
                let role = Role::from_profile(raw.as_deref());
                if !role.is_set() && raw.as_deref().is_some_and(|r| !r.trim().is_empty()) {
                    tracing::warn!(user_id = %user.id, raw_role = ?raw, "Unrecognised profile role");
                }
                role
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to load profile role");
                Role::Unset
            }
        }
    }

    fn publish(&self, state: SessionState) -> SessionState {
        self.state.send_replace(state.clone());
        state
    }
}

async fn listen(inner: Arc<SessionInner>, mut events: broadcast::Receiver<AuthEvent>) {
    inner.refresh().await;

    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!(?event, "Auth state changed");
                inner.refresh().await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Auth events lagged, refreshing");
                inner.refresh().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sdk::MemorySdk;

    const SETTLE: Duration = Duration::from_secs(5);

    async fn mounted(sdk: &MemorySdk) -> SessionContext {
        let ctx = SessionContext::mount(Arc::new(sdk.clone()));
        ctx.settled(SETTLE).await;
        ctx
    }

    #[tokio::test]
    async fn test_hydrates_stored_session() {
        let sdk = MemorySdk::new();
        let user = sdk.add_account("jane@example.com", "pw", Some("Client")).await;
        sdk.restore_session("jane@example.com").await;

        let ctx = SessionContext::mount(Arc::new(sdk.clone()));
        let mut rx = ctx.subscribe();

        let state = rx
            .wait_for(|s| !s.is_loading())
            .await
            .unwrap()
            .clone();

        assert_eq!(
            state,
            SessionState::Authenticated {
                user,
                role: Role::Client
            }
        );
        assert!(!ctx.state().is_loading());
    }

    #[tokio::test]
    async fn test_no_session_is_unauthenticated() {
        let sdk = MemorySdk::new();
        let ctx = mounted(&sdk).await;
        assert_eq!(ctx.state(), SessionState::Unauthenticated);
        assert_eq!(sdk.role_lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_loading_is_observable() {
        let sdk = MemorySdk::new();
        let user = sdk.add_account("ops@example.com", "pw", Some("employee")).await;
        sdk.restore_session("ops@example.com").await;
        sdk.delay_role_lookups(Duration::from_millis(500));

        let ctx = SessionContext::mount(Arc::new(sdk.clone()));
        let mut rx = ctx.subscribe();

        let seen = rx
            .wait_for(|s| matches!(s, SessionState::RoleLoading(_)))
            .await
            .unwrap()
            .clone();
        assert_eq!(seen, SessionState::RoleLoading(user.clone()));
        assert!(seen.is_loading());
        assert_eq!(seen.role(), None);

        let settled = ctx.settled(SETTLE).await;
        assert_eq!(settled.role(), Some(Role::Employee));
    }

    #[tokio::test]
    async fn test_failed_role_lookup_keeps_user_with_unset_role() {
        let sdk = MemorySdk::new();
        let user = sdk.add_account("jane@example.com", "pw", Some("admin")).await;
        sdk.restore_session("jane@example.com").await;
        sdk.fail_role_lookups(true);

        let ctx = mounted(&sdk).await;
        assert_eq!(
            ctx.state(),
            SessionState::Authenticated {
                user,
                role: Role::Unset
            }
        );
    }

    #[tokio::test]
    async fn test_sign_in_returns_settled_state() {
        let sdk = MemorySdk::new();
        sdk.add_account("ops@example.com", "pw", Some(" EMPLOYEE ")).await;
        let ctx = mounted(&sdk).await;

        let state = ctx
            .sign_in("ops@example.com", &SecretString::from("pw"), None)
            .await
            .unwrap();
        assert_eq!(state.role(), Some(Role::Employee));

        let err = ctx
            .sign_in("ops@example.com", &SecretString::from("wrong"), None)
            .await;
        assert!(matches!(err, Err(SdkError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_follows_external_events() {
        let sdk = MemorySdk::new();
        sdk.add_account("jane@example.com", "pw", Some("client")).await;
        sdk.restore_session("jane@example.com").await;
        let ctx = mounted(&sdk).await;
        let mut rx = ctx.subscribe();

        // Signed out from another tab.
        sdk.sign_out().await.unwrap();

        let state = rx
            .wait_for(|s| *s == SessionState::Unauthenticated)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.user(), None);
    }

    #[tokio::test]
    async fn test_refresh_profile_picks_up_role_change() {
        let sdk = MemorySdk::new();
        sdk.add_account("jane@example.com", "pw", None).await;
        sdk.restore_session("jane@example.com").await;
        let ctx = mounted(&sdk).await;
        assert_eq!(ctx.state().role(), Some(Role::Unset));

        sdk.set_role("jane@example.com", Some("client")).await;
        assert_eq!(ctx.refresh_profile().await.role(), Some(Role::Client));
    }

    #[tokio::test]
    async fn test_unmount_stops_following_events() {
        let sdk = MemorySdk::new();
        sdk.add_account("jane@example.com", "pw", Some("client")).await;
        sdk.restore_session("jane@example.com").await;
        let ctx = mounted(&sdk).await;
        let rx = ctx.subscribe();
        let lookups = sdk.role_lookups();

        ctx.unmount();
        for _ in 0..10 {
            if rx.has_changed().is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
        sdk.emit(AuthEvent::UserUpdated);
        tokio::task::yield_now().await;

        assert_eq!(sdk.role_lookups(), lookups);
        assert!(rx.has_changed().is_err());
    }
}
