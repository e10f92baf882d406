//! Autohaul portal client library.
//!
//! The client side of Autohaul: one identity SDK per process, a reactive
//! [`session::SessionContext`] fed by it, [`guard::RouteGuard`]s deciding
//! what each view may show, and a typed [`api::ApiClient`].
//!
//! ```rust,ignore
//! let portal = Portal::start(PortalConfig::from_env()?)?;
//! let state = portal.session.sign_in(email, &password, None).await?;
//! let destination = portal.post_login().wait(&portal.session).await;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod sdk;
pub mod session;

pub use api::{ApiClient, ApiClientError};
pub use config::PortalConfig;
pub use error::PortalError;
pub use guard::{Access, GuardDecision, PostLoginDecision, PostLoginRedirect, RouteGuard};
pub use sdk::{AuthEvent, IdentitySdk, SdkError};
pub use session::{SessionContext, SessionState};

/// A running client: session, API access and configuration.
#[derive(Debug)]
pub struct Portal {
    pub config: PortalConfig,
    pub session: SessionContext,
    pub api: ApiClient,
}

impl Portal {
    /// Start against the managed backend, reusing the process-wide SDK if
    /// one already exists.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the SDK or API client cannot be built.
    pub fn start(config: PortalConfig) -> Result<Self, PortalError> {
        let sdk = sdk::shared().get_or_try_init(|| {
            let sdk = sdk::SupabaseAuth::new(&config)?;
            tracing::info!(url = %config.supabase_url, "Identity SDK created");
            Ok(Arc::new(sdk))
        })?;
        Self::with_sdk(config, sdk)
    }

    /// Start with an explicit SDK.
    ///
    /// # Errors
    ///
    /// Returns error if the API client cannot be built.
    pub fn with_sdk(config: PortalConfig, sdk: Arc<dyn IdentitySdk>) -> Result<Self, PortalError> {
        let api = ApiClient::new(config.api_base_url.clone(), Arc::clone(&sdk))?;
        let session = SessionContext::mount(sdk);
        Ok(Self {
            config,
            session,
            api,
        })
    }

    /// Site key for the captcha widget on the sign-in and sign-up forms.
    ///
    /// `None` when captcha is off; the forms then send no captcha token.
    #[must_use]
    pub fn captcha_site_key(&self) -> Option<&str> {
        self.config.captcha_site_key.as_deref()
    }

    /// The post-login page's bounded wait, per configuration.
    #[must_use]
    pub fn post_login(&self) -> PostLoginRedirect {
        PostLoginRedirect::new(self.config.post_login_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::sdk::MemorySdk;

    fn config() -> PortalConfig {
        PortalConfig {
            supabase_url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("anon"),
            captcha_site_key: None,
            api_base_url: Url::parse("http://localhost:3001").unwrap(),
            post_login_timeout: Duration::from_millis(1500),
        }
    }

    #[tokio::test]
    async fn test_sign_in_then_post_login_redirect() {
        let sdk = MemorySdk::new();
        sdk.add_account("jane@example.com", "pw", Some("client")).await;
        let portal = Portal::with_sdk(config(), Arc::new(sdk)).unwrap();
        assert_eq!(portal.post_login().timeout, Duration::from_millis(1500));

        portal
            .session
            .sign_in("jane@example.com", &SecretString::from("pw"), None)
            .await
            .unwrap();

        assert_eq!(portal.post_login().wait(&portal.session).await, "/portal");
    }

    #[tokio::test]
    async fn test_captcha_site_key_is_exposed() {
        let off = Portal::with_sdk(config(), Arc::new(MemorySdk::new())).unwrap();
        assert_eq!(off.captcha_site_key(), None);

        let on = Portal::with_sdk(
            PortalConfig {
                captcha_site_key: Some("site-key".to_string()),
                ..config()
            },
            Arc::new(MemorySdk::new()),
        )
        .unwrap();
        assert_eq!(on.captcha_site_key(), Some("site-key"));
    }
}
