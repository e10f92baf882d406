//! Shipment conversion, listing and status updates.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;

use autohaul_core::{QuoteId, ShipmentId, ShipmentStatus};

use super::bad_json;
use crate::backend::BackendError;
use crate::error::AppError;
use crate::middleware::CurrentIdentity;
use crate::models::{ConvertQuoteRequest, Shipment, StatusUpdateRequest};
use crate::services::{Notification, StatusChange};
use crate::state::AppState;

/// `POST /api/shipments/from-quote` - convert a quote into a shipment.
///
/// The conversion itself is one atomic backend procedure; this handler only
/// validates input, invokes it, and re-reads the created shipment.
///
/// # Errors
///
/// 400 for a missing or malformed `quoteId`, 404 for an unknown quote,
/// 409 if the quote cannot be converted (already converted or closed),
/// 500 if the procedure fails or reports no shipment id.
pub async fn create_from_quote(
    State(state): State<AppState>,
    CurrentIdentity(ctx): CurrentIdentity,
    body: Result<Json<ConvertQuoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let Json(request) = body.map_err(|e| bad_json(&e))?;
    let quote_id: QuoteId = request
        .quote_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("quoteId is required".to_string()))?
        .parse()
        .map_err(|_| AppError::BadRequest("quoteId must be a UUID".to_string()))?;

    let shipment_id = match state.db().convert_quote_to_shipment(quote_id).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            return Err(AppError::Internal(
                "Conversion did not return a shipment id".to_string(),
            ));
        }
        Err(BackendError::Rejected(message)) => return Err(AppError::Conflict(message)),
        Err(BackendError::NotFound(_)) => {
            return Err(AppError::NotFound("Quote not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let shipment = state.db().get_shipment(shipment_id).await?.ok_or_else(|| {
        AppError::Internal(format!("Converted shipment {shipment_id} could not be read"))
    })?;

    tracing::info!(
        quote_id = %quote_id,
        shipment_id = %shipment.id,
        reference_id = %shipment.reference_id,
        converted_by = %ctx.user.id,
        "Quote converted to shipment"
    );

    Ok((StatusCode::CREATED, Json(shipment)))
}

/// `GET /api/shipments` - every shipment, newest first.
///
/// # Errors
///
/// 500 if the backend read fails.
pub async fn list_shipments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Shipment>>, AppError> {
    Ok(Json(state.db().list_shipments().await?))
}

/// `GET /api/my-shipments` - shipments for the caller's own email.
///
/// The filter comes from the resolved identity, never from the request.
///
/// # Errors
///
/// 500 if the backend read fails.
pub async fn my_shipments(
    State(state): State<AppState>,
    CurrentIdentity(ctx): CurrentIdentity,
) -> Result<Json<Vec<Shipment>>, AppError> {
    let Some(email) = ctx.user.email() else {
        tracing::debug!(user_id = %ctx.user.id, "Caller has no email, no shipments");
        return Ok(Json(Vec::new()));
    };

    Ok(Json(state.db().list_shipments_for_email(&email).await?))
}

/// `PATCH /api/shipments/{id}/status` - set a shipment's status.
///
/// Any of the five statuses may follow any other. `updated_at` is written
/// together with the status.
///
/// # Errors
///
/// 400 for a status outside the allowed set or a malformed id, 404 for an
/// unknown shipment, 500 if the update fails.
pub async fn update_status(
    State(state): State<AppState>,
    CurrentIdentity(ctx): CurrentIdentity,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Shipment>, AppError> {
    let Json(request) = body.map_err(|e| bad_json(&e))?;
    let raw = request.status.unwrap_or_default();
    let status: ShipmentStatus = raw.parse().map_err(|_| AppError::InvalidStatus(raw))?;
    let id: ShipmentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid shipment id".to_string()))?;

    let shipment = state
        .db()
        .update_shipment_status(id, status, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Shipment not found".to_string()))?;

    tracing::info!(
        shipment_id = %id,
        status = %status,
        updated_by = %ctx.user.id,
        "Shipment status updated"
    );

    match StatusChange::for_shipment(&shipment) {
        Some(change) => {
            if let Err(e) = state
                .notifications()
                .enqueue(Notification::StatusChanged(change))
            {
                tracing::warn!(shipment_id = %id, error = %e, "Failed to queue status email");
            }
        }
        None => tracing::warn!(shipment_id = %id, "Shipment has no deliverable email"),
    }

    Ok(Json(shipment))
}
