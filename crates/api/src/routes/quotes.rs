//! Quote intake and back-office quote management.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use autohaul_core::{QuoteId, QuoteStatus};

use super::bad_json;
use crate::error::AppError;
use crate::middleware::CurrentIdentity;
use crate::models::{Quote, QuoteCreated, QuoteIntake};
use crate::services::{Notification, QuoteSummary};
use crate::state::AppState;

/// `POST /api/quotes` - public quote intake.
///
/// Stores the quote, queues the new-quote emails, and returns the stored
/// row with a `referenceId` alias.
///
/// # Errors
///
/// 400 for a malformed body or missing required fields, 500 if the insert fails.
pub async fn create_quote(
    State(state): State<AppState>,
    body: Result<Json<QuoteIntake>, JsonRejection>,
) -> Result<(StatusCode, Json<QuoteCreated>), AppError> {
    let Json(intake) = body.map_err(|e| bad_json(&e))?;
    let new_quote = intake.into_new_quote().map_err(AppError::BadRequest)?;

    let quote = state.db().insert_quote(&new_quote).await?;
    tracing::info!(
        quote_id = %quote.id,
        reference_id = %quote.reference_id,
        "Quote submitted"
    );

    match QuoteSummary::for_quote(&quote) {
        Some(summary) => {
            if let Err(e) = state
                .notifications()
                .enqueue(Notification::NewQuote(summary))
            {
                tracing::warn!(quote_id = %quote.id, error = %e, "Failed to queue new-quote emails");
            }
        }
        None => tracing::warn!(quote_id = %quote.id, "Stored quote has no deliverable email"),
    }

    Ok((StatusCode::CREATED, Json(QuoteCreated::from(quote))))
}

/// `GET /api/quotes` - every quote, newest first.
///
/// # Errors
///
/// 500 if the backend read fails.
pub async fn list_quotes(State(state): State<AppState>) -> Result<Json<Vec<Quote>>, AppError> {
    Ok(Json(state.db().list_quotes().await?))
}

/// `PATCH /api/quotes/{id}/close` - close a quote without converting it.
///
/// # Errors
///
/// 400 for a malformed id, 404 for an unknown quote, 409 if the quote has
/// already been converted.
pub async fn close_quote(
    State(state): State<AppState>,
    CurrentIdentity(ctx): CurrentIdentity,
    Path(id): Path<String>,
) -> Result<Json<Quote>, AppError> {
    let id: QuoteId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid quote id".to_string()))?;

    if let Some(quote) = state.db().close_quote(id).await? {
        tracing::info!(quote_id = %id, closed_by = %ctx.user.id, "Quote closed");
        return Ok(Json(quote));
    }

    match state.db().get_quote(id).await? {
        None => Err(AppError::NotFound("Quote not found".to_string())),
        Some(quote) if quote.quote_status == QuoteStatus::Converted => Err(AppError::Conflict(
            "Quote has already been converted".to_string(),
        )),
        // Raced with another writer; report what is stored now.
        Some(quote) => Ok(Json(quote)),
    }
}
