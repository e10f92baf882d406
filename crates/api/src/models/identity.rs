//! Authenticated identities.

use serde::{Deserialize, Serialize};

use autohaul_core::{Email, Role, UserId};

/// A user record as returned by the managed auth provider.
///
/// Owned entirely by the provider; this service only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Provider-assigned id, shared with the `profiles` table.
    pub id: UserId,
    /// Sign-in email, absent for phone-only accounts.
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata captured at sign-up.
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

/// Identity attached to a request once `require_auth` has passed.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The verified caller.
    pub user: User,
    /// Role from the caller's profile; `Unset` when it could not be read.
    pub role: Role,
}
