//! Identity SDK over the managed backend's auth and profile endpoints.
//!
//! # API Reference
//!
//! - Sign in: `POST {url}/auth/v1/token?grant_type=password`
//! - Refresh: `POST {url}/auth/v1/token?grant_type=refresh_token`
//! - Sign up: `POST {url}/auth/v1/signup`
//! - Sign out: `POST {url}/auth/v1/logout`
//! - Current user: `GET {url}/auth/v1/user`
//! - Profiles: `{url}/rest/v1/profiles` (row-level security scoped to the caller)
//!
//! Every request carries the anon key as `apikey`; user-scoped requests add
//! the session's access token as the bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use url::Url;

use autohaul_core::UserId;

use super::{AuthEvent, EVENT_CAPACITY, IdentitySdk, SdkError, Session, SignUp, User};
use crate::config::PortalConfig;

/// Managed backend identity SDK.
#[derive(Clone)]
pub struct SupabaseAuth {
    inner: Arc<SupabaseAuthInner>,
}

struct SupabaseAuthInner {
    client: reqwest::Client,
    base_url: Url,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

/// Successful token grant.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        Self {
            access_token: SecretString::from(token.access_token),
            refresh_token: SecretString::from(token.refresh_token),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
            user: token.user,
        }
    }
}

/// Auth error body; the provider uses several shapes.
#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    role: Option<String>,
}

impl SupabaseAuth {
    /// Create a new SDK from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the anon key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &PortalConfig) -> Result<Self, SdkError> {
        let mut apikey = HeaderValue::from_str(config.anon_key.expose_secret())
            .map_err(|e| SdkError::Decode(format!("Invalid anon key format: {e}")))?;
        apikey.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(SupabaseAuthInner {
                client,
                base_url: config.supabase_url.clone(),
                session: RwLock::new(None),
                events,
            }),
        })
    }

    /// Adopt a session persisted by an earlier run.
    ///
    /// No event is emitted; the next [`IdentitySdk::current_user`] call
    /// validates the session with the provider.
    pub async fn restore_session(&self, session: Session) {
        *self.inner.session.write().await = Some(session);
    }

    /// The current session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// Exchange the refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::NotSignedIn`] without a session, or the provider's
    /// error. A rejected refresh token ends the session.
    pub async fn refresh_session(&self) -> Result<Session, SdkError> {
        let refresh_token = self
            .session()
            .await
            .map(|s| s.refresh_token)
            .ok_or(SdkError::NotSignedIn)?;

        let response = self
            .inner
            .client
            .post(self.endpoint("auth/v1/token", &[("grant_type", "refresh_token")]))
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }))
            .send()
            .await?;

        match handle_response::<TokenResponse>(response).await {
            Ok(token) => {
                let session = Session::from(token);
                *self.inner.session.write().await = Some(session.clone());
                self.emit(AuthEvent::TokenRefreshed);
                Ok(session)
            }
            Err(e) => {
                if matches!(e, SdkError::InvalidCredentials | SdkError::Api { status: 401 | 403, .. }) {
                    self.end_session().await;
                }
                Err(e)
            }
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.inner.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/{path}"));
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    async fn end_session(&self) {
        let had_session = self.inner.session.write().await.take().is_some();
        if had_session {
            self.emit(AuthEvent::SignedOut);
        }
    }

    /// Access token for the current session, refreshing it first if expired.
    async fn live_token(&self) -> Result<SecretString, SdkError> {
        let session = self.session().await.ok_or(SdkError::NotSignedIn)?;
        if session.is_expired(Utc::now()) {
            tracing::debug!("Access token expired, refreshing");
            return Ok(self.refresh_session().await?.access_token);
        }
        Ok(session.access_token)
    }

    async fn start_session(&self, token: TokenResponse) -> User {
        let session = Session::from(token);
        let user = session.user.clone();
        *self.inner.session.write().await = Some(session);
        self.emit(AuthEvent::SignedIn);
        user
    }
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IdentitySdk for SupabaseAuth {
    async fn current_user(&self) -> Result<Option<User>, SdkError> {
        let token = match self.live_token().await {
            Ok(token) => token,
            Err(SdkError::NotSignedIn) => return Ok(None),
            Err(e) if is_auth_failure(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let response = self
            .inner
            .client
            .get(self.endpoint("auth/v1/user", &[]))
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        match handle_response::<User>(response).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if is_auth_failure(&e) => {
                tracing::debug!("Stored session rejected by provider");
                self.end_session().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, SdkError> {
        let token = self.live_token().await?;
        let filter = format!("eq.{user_id}");

        let response = self
            .inner
            .client
            .get(self.endpoint(
                "rest/v1/profiles",
                &[("select", "role"), ("id", &filter), ("limit", "1")],
            ))
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let rows: Vec<ProfileRow> = handle_response(response).await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
        captcha_token: Option<&str>,
    ) -> Result<User, SdkError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("auth/v1/token", &[("grant_type", "password")]))
            .json(&json!({
                "email": email.trim(),
                "password": password.expose_secret(),
                "gotrue_meta_security": { "captcha_token": captcha_token },
            }))
            .send()
            .await?;

        let token: TokenResponse = handle_response(response).await?;
        let user = self.start_session(token).await;
        tracing::info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<User, SdkError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("auth/v1/signup", &[]))
            .json(&json!({
                "email": request.email.trim(),
                "password": request.password.expose_secret(),
                "data": {
                    "full_name": request.full_name,
                    "phone": request.phone,
                },
                "gotrue_meta_security": { "captcha_token": request.captcha_token },
            }))
            .send()
            .await?;

        let body: Value = handle_response(response).await?;

        // With confirmation enabled the provider returns the bare user.
        if body.get("access_token").is_none() {
            let user: User = serde_json::from_value(body)
                .map_err(|e| SdkError::Decode(format!("Failed to parse sign-up user: {e}")))?;
            tracing::info!(user_id = %user.id, "Signed up, confirmation pending");
            return Ok(user);
        }

        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| SdkError::Decode(format!("Failed to parse sign-up session: {e}")))?;
        let user = self.start_session(token).await;
        tracing::info!(user_id = %user.id, "Signed up");

        if let Some(phone) = request.phone.as_deref().filter(|p| !p.trim().is_empty())
            && let Err(e) = self.update_phone(phone).await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to save phone at sign-up");
        }

        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), SdkError> {
        let Some(session) = self.session().await else {
            return Ok(());
        };

        let result = self
            .inner
            .client
            .post(self.endpoint("auth/v1/logout", &[]))
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await;

        // The local session ends even if the provider call fails.
        self.end_session().await;

        let response = result?;
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(parse_error(response).await)
    }

    async fn access_token(&self) -> Option<SecretString> {
        self.live_token().await.ok()
    }

    async fn update_phone(&self, phone: &str) -> Result<(), SdkError> {
        let session = self.session().await.ok_or(SdkError::NotSignedIn)?;
        let token = self.live_token().await?;
        let filter = format!("eq.{}", session.user.id);

        let response = self
            .inner
            .client
            .patch(self.endpoint("rest/v1/profiles", &[("id", &filter)]))
            .bearer_auth(token.expose_secret())
            .header("Prefer", "return=minimal")
            .json(&json!({ "phone": phone.trim() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(parse_error(response).await);
        }

        self.emit(AuthEvent::UserUpdated);
        Ok(())
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SdkError> {
    if response.status().is_success() {
        return response
            .json()
            .await
            .map_err(|e| SdkError::Decode(format!("Failed to parse response: {e}")));
    }

    Err(parse_error(response).await)
}

async fn parse_error(response: reqwest::Response) -> SdkError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    classify_error(status, &body)
}

fn classify_error(status: u16, body: &str) -> SdkError {
    let parsed = serde_json::from_str::<AuthErrorBody>(body).ok();

    if parsed
        .as_ref()
        .and_then(|e| e.error.as_deref())
        .is_some_and(|code| code == "invalid_grant")
    {
        return SdkError::InvalidCredentials;
    }

    let message = parsed
        .and_then(|e| e.error_description.or(e.msg).or(e.message).or(e.error))
        .unwrap_or_else(|| body.to_string());

    SdkError::Api { status, message }
}

const fn is_auth_failure(error: &SdkError) -> bool {
    matches!(error, SdkError::Api { status: 401 | 403, .. })
}
