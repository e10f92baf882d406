//! Autohaul API library.
//!
//! Quote intake, public tracking, the client portal's shipment feed and the
//! back-office quote and shipment routes, served over axum. Persistence and
//! identity live in the managed backend (see [`backend`]); outbound email goes
//! through the [`services::NotificationQueue`].
//!
//! # Security
//!
//! This crate holds the backend's service-role key, which bypasses row-level
//! security. Every privileged route is gated per request by
//! [`middleware::require_auth`] plus a role gate.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::time::Duration;

use axum::{Router, http::HeaderValue, middleware::from_fn};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use state::AppState;

/// Build the complete application router.
///
/// `cors_origins` lists browser origins allowed to call the API; an empty
/// list admits any origin.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(routes::routes(&state))
        .layer(cors_layer(cors_origins))
        .layer(from_fn(middleware::request_id))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                        request_id = tracing::field::Empty,
                        role = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_origins(origins))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(Duration::from_secs(600))
}

fn parse_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect()
}
