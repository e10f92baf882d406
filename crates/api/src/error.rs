//! Unified error handling for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use autohaul_core::{ShipmentStatus, UserId};

use crate::backend::BackendError;
use crate::services::notifications::NotifyError;

/// Application-level error type for the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Managed backend operation failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Notification could not be queued.
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Status value outside the allowed set.
    #[error("Invalid status: {0:?}")]
    InvalidStatus(String),

    /// Request conflicts with the current state of the resource.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Backend(_) | Self::Notify(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "API request error"
            );
        }

        // Don't expose internal error details to clients
        let body = match self {
            Self::Backend(_) | Self::Notify(_) | Self::Internal(_) => {
                json!({ "error": "Internal server error" })
            }
            Self::NotFound(message) => json!({ "message": message }),
            Self::InvalidStatus(_) => json!({
                "error": "Invalid status",
                "validStatuses": ShipmentStatus::labels(),
            }),
            Self::BadRequest(message)
            | Self::Conflict(message) => json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

/// Set the Sentry user context from a resolved identity.
pub fn set_sentry_user(user_id: UserId, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("shipment".to_string());
        assert_eq!(err.to_string(), "Not found: shipment");

        let err = AppError::BadRequest("quoteId is required".to_string());
        assert_eq!(err.to_string(), "Bad request: quoteId is required");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::InvalidStatus("Lost".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Conflict("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Backend(BackendError::Unauthorized)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = AppError::Backend(BackendError::Api {
            status: 500,
            message: "relation \"shipments\" does not exist".to_string(),
        })
        .into_response();
        let body = body_json(response).await;
        assert_eq!(body, json!({ "error": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_not_found_uses_message_body() {
        let body = body_json(AppError::NotFound("Shipment not found".to_string()).into_response()).await;
        assert_eq!(body, json!({ "message": "Shipment not found" }));
    }

    #[tokio::test]
    async fn test_invalid_status_lists_valid_values() {
        let body = body_json(AppError::InvalidStatus("Lost".to_string()).into_response()).await;
        assert_eq!(body["validStatuses"].as_array().unwrap().len(), 5);
        assert_eq!(body["validStatuses"][1], "Driver Assigned");
    }
}
