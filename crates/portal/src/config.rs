//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Managed backend project URL
//! - `SUPABASE_ANON_KEY` - Public (row-level-security bound) API key
//!
//! ## Optional
//! - `CAPTCHA_SITE_KEY` - Captcha site key shown on sign-up
//! - `API_BASE_URL` - Autohaul API base URL (default: `http://localhost:3001`)
//! - `POST_LOGIN_TIMEOUT_MS` - Longest wait for session hydration after
//!   sign-in before falling back to a default page (default: 4000)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_POST_LOGIN_TIMEOUT_MS: u64 = 4000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client-side configuration.
///
/// Implements `Debug` manually to redact the anon key.
#[derive(Clone)]
pub struct PortalConfig {
    /// Managed backend project URL
    pub supabase_url: Url,
    /// Public API key sent with every identity and profile call
    pub anon_key: SecretString,
    /// Captcha site key, when sign-up is captcha protected
    pub captcha_site_key: Option<String>,
    /// Base URL of the Autohaul API
    pub api_base_url: Url,
    /// Hydration timeout for the post-login redirect page
    pub post_login_timeout: Duration,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("supabase_url", &self.supabase_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("captcha_site_key", &self.captcha_site_key)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("post_login_timeout", &self.post_login_timeout)
            .finish()
    }
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let supabase_url = parse_url("SUPABASE_URL", &get_required_env("SUPABASE_URL")?)?;
        let anon_key = get_required_env("SUPABASE_ANON_KEY")?;
        if anon_key.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "SUPABASE_ANON_KEY".to_string(),
                "must not be blank".to_string(),
            ));
        }
        let api_base_url = parse_url(
            "API_BASE_URL",
            &get_env_or_default("API_BASE_URL", DEFAULT_API_BASE_URL),
        )?;
        let timeout_ms = get_optional_env("POST_LOGIN_TIMEOUT_MS")
            .map(|raw| {
                raw.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("POST_LOGIN_TIMEOUT_MS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_POST_LOGIN_TIMEOUT_MS);

        Ok(Self {
            supabase_url,
            anon_key: SecretString::from(anon_key),
            captcha_site_key: get_optional_env("CAPTCHA_SITE_KEY")
                .filter(|k| !k.trim().is_empty()),
            api_base_url,
            post_login_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_rejects_garbage() {
        let err = parse_url("API_BASE_URL", "not a url").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "API_BASE_URL"));
    }

    #[test]
    fn test_parse_url_trims() {
        let url = parse_url("SUPABASE_URL", "  https://abc.supabase.co ").unwrap();
        assert_eq!(url.host_str(), Some("abc.supabase.co"));
    }

    #[test]
    fn test_debug_redacts_anon_key() {
        let config = PortalConfig {
            supabase_url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("eyJhbGciOiJIUzI1NiJ9.anon-key-value"),
            captcha_site_key: Some("site-key".to_string()),
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).unwrap(),
            post_login_timeout: Duration::from_millis(DEFAULT_POST_LOGIN_TIMEOUT_MS),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("abc.supabase.co"));
        assert!(debug_output.contains("site-key"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("anon-key-value"));
    }
}
