//! Public shipment tracking.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use autohaul_core::{Email, ReferenceId};

use crate::error::AppError;
use crate::models::Shipment;
use crate::state::AppState;

/// Query for `GET /api/track`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackQuery {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// `GET /api/track?referenceId=..&email=..` - look up one shipment.
///
/// The reference id must match exactly and the email case-insensitively.
/// If several rows match, the newest is returned.
///
/// # Errors
///
/// 400 when either parameter is missing or the email is malformed, 404 when
/// nothing matches.
pub async fn track_shipment(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<Shipment>, AppError> {
    let (Some(reference_id), Some(email)) = (
        query.reference_id.as_deref().and_then(ReferenceId::from_input),
        query.email.as_deref().filter(|e| !e.trim().is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "referenceId and email are required".to_string(),
        ));
    };
    let email = Email::parse(email).map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;

    state
        .db()
        .find_shipment_for_tracking(&reference_id, &email)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(
                "No shipment found for that reference ID and email".to_string(),
            )
        })
}
