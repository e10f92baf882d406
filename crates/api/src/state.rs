//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::Database;
use crate::services::{IdentityResolver, NotificationQueue};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds no per-request or per-user data;
/// every request resolves its own identity.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    identity: IdentityResolver,
    db: Arc<dyn Database>,
    notifications: NotificationQueue,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        identity: IdentityResolver,
        db: Arc<dyn Database>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                identity,
                db,
                notifications,
            }),
        }
    }

    /// Get the identity resolver.
    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.inner.identity
    }

    /// Get the managed backend tables and procedures.
    #[must_use]
    pub fn db(&self) -> &dyn Database {
        self.inner.db.as_ref()
    }

    /// Get the outbound notification queue.
    #[must_use]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.inner.notifications
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("notifications", &self.inner.notifications)
            .finish_non_exhaustive()
    }
}
