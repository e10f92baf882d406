//! In-memory identity SDK for tests and offline development.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, broadcast};

use autohaul_core::UserId;

use super::{AuthEvent, EVENT_CAPACITY, IdentitySdk, SdkError, SignUp, User};

/// Identity SDK backed by in-process maps.
#[derive(Clone)]
pub struct MemorySdk {
    inner: Arc<MemorySdkInner>,
}

struct MemorySdkInner {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<AuthEvent>,
    fail_role_lookups: AtomicBool,
    role_lookups: AtomicU64,
    role_delay_ms: AtomicU64,
}

#[derive(Default)]
struct MemoryState {
    /// Accounts keyed by lowercase email.
    accounts: HashMap<String, Account>,
    /// Email of the signed-in account.
    signed_in: Option<String>,
}

struct Account {
    password: SecretString,
    user: User,
    role: Option<String>,
}

impl Default for MemorySdk {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(MemorySdkInner {
                state: Mutex::new(MemoryState::default()),
                events,
                fail_role_lookups: AtomicBool::new(false),
                role_lookups: AtomicU64::new(0),
                role_delay_ms: AtomicU64::new(0),
            }),
        }
    }
}

impl MemorySdk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a raw profile role.
    pub async fn add_account(&self, email: &str, password: &str, role: Option<&str>) -> User {
        let user = User {
            id: UserId::random(),
            email: Some(email.to_string()),
            phone: None,
            user_metadata: serde_json::Value::Null,
        };
        self.inner.state.lock().await.accounts.insert(
            email.to_lowercase(),
            Account {
                password: SecretString::from(password),
                user: user.clone(),
                role: role.map(str::to_string),
            },
        );
        user
    }

    /// Mark an account as signed in without emitting an event, as if the
    /// session had been persisted by an earlier page load.
    pub async fn restore_session(&self, email: &str) {
        self.inner.state.lock().await.signed_in = Some(email.to_lowercase());
    }

    /// Change a profile role. Emits nothing; profile edits do not raise
    /// auth events.
    pub async fn set_role(&self, email: &str, role: Option<&str>) {
        if let Some(account) = self.inner.state.lock().await.accounts.get_mut(&email.to_lowercase()) {
            account.role = role.map(str::to_string);
        }
    }

    /// Push an auth event to subscribers.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Make profile lookups fail.
    pub fn fail_role_lookups(&self, fail: bool) {
        self.inner.fail_role_lookups.store(fail, Ordering::SeqCst);
    }

    /// Delay every profile lookup.
    pub fn delay_role_lookups(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.role_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of profile lookups served.
    #[must_use]
    pub fn role_lookups(&self) -> u64 {
        self.inner.role_lookups.load(Ordering::SeqCst)
    }

    /// Phone stored for an account.
    pub async fn phone(&self, email: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .await
            .accounts
            .get(&email.to_lowercase())
            .and_then(|a| a.user.phone.clone())
    }
}

impl std::fmt::Debug for MemorySdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySdk").finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentitySdk for MemorySdk {
    async fn current_user(&self) -> Result<Option<User>, SdkError> {
        let state = self.inner.state.lock().await;
        Ok(state
            .signed_in
            .as_ref()
            .and_then(|email| state.accounts.get(email))
            .map(|account| account.user.clone()))
    }

    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, SdkError> {
        self.inner.role_lookups.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.role_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.inner.fail_role_lookups.load(Ordering::SeqCst) {
            return Err(SdkError::Api {
                status: 500,
                message: "profile lookup failed".to_string(),
            });
        }

        let state = self.inner.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.user.id == user_id)
            .and_then(|account| account.role.clone()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
        _captcha_token: Option<&str>,
    ) -> Result<User, SdkError> {
        let key = email.trim().to_lowercase();
        let user = {
            let mut state = self.inner.state.lock().await;
            let account = state
                .accounts
                .get(&key)
                .filter(|a| a.password.expose_secret() == password.expose_secret())
                .ok_or(SdkError::InvalidCredentials)?;
            let user = account.user.clone();
            state.signed_in = Some(key);
            user
        };
        self.emit(AuthEvent::SignedIn);
        Ok(user)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<User, SdkError> {
        let key = request.email.trim().to_lowercase();
        let user = {
            let mut state = self.inner.state.lock().await;
            if state.accounts.contains_key(&key) {
                return Err(SdkError::Api {
                    status: 422,
                    message: "User already registered".to_string(),
                });
            }
            let user = User {
                id: UserId::random(),
                email: Some(request.email.trim().to_string()),
                phone: request.phone.clone(),
                user_metadata: serde_json::json!({ "full_name": request.full_name }),
            };
            state.accounts.insert(
                key.clone(),
                Account {
                    password: request.password.clone(),
                    user: user.clone(),
                    role: None,
                },
            );
            state.signed_in = Some(key);
            user
        };
        self.emit(AuthEvent::SignedIn);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), SdkError> {
        let had_session = self.inner.state.lock().await.signed_in.take().is_some();
        if had_session {
            self.emit(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn access_token(&self) -> Option<SecretString> {
        let state = self.inner.state.lock().await;
        state
            .signed_in
            .as_ref()
            .and_then(|email| state.accounts.get(email))
            .map(|account| SecretString::from(format!("memory-token-{}", account.user.id)))
    }

    async fn update_phone(&self, phone: &str) -> Result<(), SdkError> {
        {
            let mut state = self.inner.state.lock().await;
            let email = state.signed_in.clone().ok_or(SdkError::NotSignedIn)?;
            let account = state.accounts.get_mut(&email).ok_or(SdkError::NotSignedIn)?;
            account.user.phone = Some(phone.trim().to_string());
        }
        self.emit(AuthEvent::UserUpdated);
        Ok(())
    }
}
