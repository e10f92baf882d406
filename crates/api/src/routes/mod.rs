//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET   /api/health                  - Health check
//!
//! # Public
//! POST  /api/quotes                  - Quote intake
//! GET   /api/track                   - Track a shipment (?referenceId&email)
//! POST  /api/notifications/status    - Send a status-change email
//! POST  /api/notifications/new-quote - Send new-quote emails
//!
//! # Client (any authenticated non-staff caller)
//! GET   /api/my-shipments            - Shipments for the caller's own email
//!
//! # Staff (admin or employee)
//! GET   /api/quotes                  - All quotes
//! PATCH /api/quotes/{id}/close       - Close a quote without converting it
//! GET   /api/shipments               - All shipments
//! POST  /api/shipments/from-quote    - Convert a quote into a shipment
//! PATCH /api/shipments/{id}/status   - Update a shipment's status
//! ```

use axum::{
    Router,
    extract::rejection::JsonRejection,
    middleware::{from_fn, from_fn_with_state},
    routing::{MethodRouter, get, patch, post},
};

use autohaul_core::Role;

use crate::error::AppError;
use crate::middleware::{require_auth, require_client, require_one_of};
use crate::state::AppState;

pub mod health;
pub mod notifications;
pub mod quotes;
pub mod shipments;
pub mod tracking;

/// Roles admitted to back-office routes.
const STAFF: &[Role] = &Role::STAFF;

/// Build the API routes.
///
/// Gates are attached per route so unknown paths still 404 rather than 401.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health::health))
        // Public
        .route(
            "/api/quotes",
            post(quotes::create_quote).merge(staff_only(state, get(quotes::list_quotes))),
        )
        .route("/api/track", get(tracking::track_shipment))
        .route(
            "/api/notifications/status",
            post(notifications::send_status_update),
        )
        .route(
            "/api/notifications/new-quote",
            post(notifications::send_new_quote),
        )
        // Client
        .route(
            "/api/my-shipments",
            client_only(state, get(shipments::my_shipments)),
        )
        // Staff
        .route(
            "/api/quotes/{id}/close",
            staff_only(state, patch(quotes::close_quote)),
        )
        .route(
            "/api/shipments",
            staff_only(state, get(shipments::list_shipments)),
        )
        .route(
            "/api/shipments/from-quote",
            staff_only(state, post(shipments::create_from_quote)),
        )
        .route(
            "/api/shipments/{id}/status",
            staff_only(state, patch(shipments::update_status)),
        )
}

/// Gate a method router to admin and employee callers.
fn staff_only(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route
        .route_layer(from_fn_with_state(STAFF, require_one_of))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

/// Gate a method router to authenticated non-staff callers.
fn client_only(state: &AppState, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route
        .route_layer(from_fn(require_client))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

/// Map a JSON body rejection onto a 400.
pub(crate) fn bad_json(rejection: &JsonRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}
