//! Top-level error for wiring the portal together.

use thiserror::Error;

use crate::api::ApiClientError;
use crate::config::ConfigError;
use crate::sdk::SdkError;

/// Errors from starting or driving the portal.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Identity SDK failed.
    #[error("Identity error: {0}")]
    Sdk(#[from] SdkError),

    /// API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiClientError),
}
