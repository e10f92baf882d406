//! Identity SDK seam.
//!
//! The session context and the API client never talk to the identity
//! provider directly; they go through [`IdentitySdk`], which is implemented
//! for the managed backend ([`SupabaseAuth`]) and in memory for tests
//! ([`MemorySdk`]).
//!
//! One SDK instance should exist per process. Construct it through
//! [`SdkHandle`] so every consumer shares the same session listener.

pub mod memory;
pub mod shared;
pub mod supabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use autohaul_core::{Email, UserId};

pub use memory::MemorySdk;
pub use shared::{SdkHandle, shared};
pub use supabase::SupabaseAuth;

/// Buffered auth events per subscriber before older ones are dropped.
pub const EVENT_CAPACITY: usize = 16;

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum SdkError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("Identity provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Email and password did not match.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The operation needs a signed-in user.
    #[error("Not signed in")]
    NotSignedIn,

    /// Response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// A user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl User {
    /// The user's email, if present and well formed.
    #[must_use]
    pub fn email(&self) -> Option<Email> {
        self.email.as_deref().and_then(|e| Email::parse(e).ok())
    }
}

/// A signed-in session.
///
/// Implements `Debug` manually to redact both tokens.
#[derive(Clone)]
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

impl Session {
    /// Whether the access token has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish()
    }
}

/// Auth-state changes pushed by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Self-service registration details.
#[derive(Clone)]
pub struct SignUp {
    pub email: String,
    pub password: SecretString,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    /// Token from the captcha widget, when sign-up is captcha protected.
    pub captcha_token: Option<String>,
}

impl std::fmt::Debug for SignUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUp")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("full_name", &self.full_name)
            .field("phone", &self.phone)
            .field("captcha_token", &self.captcha_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Client-side identity operations.
#[async_trait]
pub trait IdentitySdk: Send + Sync {
    /// The signed-in user, validated with the provider. `None` when signed out.
    async fn current_user(&self) -> Result<Option<User>, SdkError>;

    /// The raw `role` column of a user's profile.
    async fn fetch_role(&self, user_id: UserId) -> Result<Option<String>, SdkError>;

    /// Subscribe to auth-state changes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
        captcha_token: Option<&str>,
    ) -> Result<User, SdkError>;

    /// Register a new account. Returns the created user; a session starts
    /// only when the provider does not require email confirmation.
    async fn sign_up(&self, request: &SignUp) -> Result<User, SdkError>;

    /// End the current session. Signing out while signed out is not an error.
    async fn sign_out(&self) -> Result<(), SdkError>;

    /// Bearer token for API calls, if signed in.
    async fn access_token(&self) -> Option<SecretString>;

    /// Set the phone number on the signed-in user's profile.
    async fn update_phone(&self, phone: &str) -> Result<(), SdkError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session {
            access_token: SecretString::from("access-token-value"),
            refresh_token: SecretString::from("refresh-token-value"),
            expires_at: None,
            user: User {
                id: UserId::random(),
                email: Some("jane@example.com".to_string()),
                phone: None,
                user_metadata: serde_json::Value::Null,
            },
        };

        let debug_output = format!("{session:?}");
        assert!(!debug_output.contains("access-token-value"));
        assert!(!debug_output.contains("refresh-token-value"));
        assert!(!debug_output.contains("jane@example.com"));
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let mut session = Session {
            access_token: SecretString::from("a"),
            refresh_token: SecretString::from("r"),
            expires_at: None,
            user: User {
                id: UserId::random(),
                email: None,
                phone: None,
                user_metadata: serde_json::Value::Null,
            },
        };
        assert!(!session.is_expired(now));

        session.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(session.is_expired(now));
    }

    #[test]
    fn test_user_deserializes_provider_payload() {
        let user: User = serde_json::from_value(serde_json::json!({
            "id": "0b6c3c1e-8f8e-4a47-9d59-0d3c7c8a1f00",
            "email": "Jane@Example.com",
            "aud": "authenticated",
            "user_metadata": { "full_name": "Jane Doe" }
        }))
        .unwrap();

        assert_eq!(user.email().unwrap().normalized(), "jane@example.com");
        assert!(user.phone.is_none());
    }
}
