//! Email trigger endpoints used by the web front end.
//!
//! Both handlers only validate and enqueue. Delivery happens on the
//! notification worker and its outcome never changes these responses.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

use autohaul_core::{Email, ShipmentStatus};

use super::bad_json;
use crate::error::AppError;
use crate::models::QuoteIntake;
use crate::services::{Notification, QuoteSummary, StatusChange};
use crate::state::AppState;

/// Body of `POST /api/notifications/status`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotice {
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Body of `POST /api/notifications/new-quote`: quote intake fields plus
/// an optional reference id assigned by the caller.
#[derive(Debug, Deserialize)]
pub struct NewQuoteNotice {
    #[serde(default, rename = "referenceId")]
    pub reference_id: Option<String>,
    #[serde(flatten)]
    pub quote: QuoteIntake,
}

/// `POST /api/notifications/status` - queue a status-change email.
///
/// # Errors
///
/// 400 for a missing field, a malformed email or an unknown status; 500 if
/// the notification cannot be queued.
pub async fn send_status_update(
    State(state): State<AppState>,
    body: Result<Json<StatusNotice>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(notice) = body.map_err(|e| bad_json(&e))?;

    let (Some(email), Some(name), Some(status), Some(order_id)) = (
        non_blank(notice.customer_email),
        non_blank(notice.customer_name),
        non_blank(notice.status),
        non_blank(notice.order_id),
    ) else {
        return Err(AppError::BadRequest(
            "customerEmail, customerName, status and orderId are required".to_string(),
        ));
    };

    let customer_email =
        Email::parse(&email).map_err(|e| AppError::BadRequest(format!("Invalid customerEmail: {e}")))?;
    let status: ShipmentStatus = status
        .parse()
        .map_err(|_| AppError::InvalidStatus(status))?;

    state
        .notifications()
        .enqueue(Notification::StatusChanged(StatusChange {
            customer_email,
            customer_name: name,
            status,
            order_id: order_id.clone(),
        }))?;

    tracing::info!(order_id = %order_id, status = %status, "Status email queued");
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/notifications/new-quote` - queue the internal alert and the
/// customer confirmation for a quote.
///
/// # Errors
///
/// 400 for a malformed body or an invalid quote. Queueing failures are
/// logged and still reported as success.
pub async fn send_new_quote(
    State(state): State<AppState>,
    body: Result<Json<NewQuoteNotice>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(notice) = body.map_err(|e| bad_json(&e))?;
    let new_quote = notice.quote.into_new_quote().map_err(AppError::BadRequest)?;

    let reference_id = non_blank(notice.reference_id)
        .unwrap_or_else(|| new_quote.reference_id.to_string());
    let summary = QuoteSummary::for_new_quote(&new_quote, Some(reference_id.clone()));

    match state.notifications().enqueue(Notification::NewQuote(summary)) {
        Ok(()) => tracing::info!(reference_id = %reference_id, "New-quote emails queued"),
        Err(e) => {
            tracing::warn!(reference_id = %reference_id, error = %e, "Failed to queue new-quote emails");
        }
    }

    Ok(Json(json!({ "success": true })))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
