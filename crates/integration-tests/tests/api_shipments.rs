//! Integration tests for conversion, status updates, tracking and the
//! client shipment feed.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use autohaul_core::ShipmentStatus;
use autohaul_integration_tests::{TestApp, jane_doe, quote_for};

// =============================================================================
// Conversion
// =============================================================================

#[tokio::test]
async fn test_convert_quote_creates_submitted_shipment() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let quote = app.create_quote(jane_doe()).await;

    let response = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": quote["id"] }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let shipment = &response.body;
    assert_eq!(shipment["status"], "Submitted");
    assert_eq!(shipment["reference_id"], quote["referenceId"]);
    assert_eq!(shipment["quote_id"], quote["id"]);
    assert_eq!(shipment["customer_name"], "Jane Doe");
    assert_eq!(app.backend.quotes().await[0].quote_status.to_string(), "converted");
}

#[tokio::test]
async fn test_convert_links_existing_account() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.user(Some("Jane@Example.com"), Some("client")).await;
    let quote = app.create_quote(jane_doe()).await;

    let response = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": quote["id"] }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.body["user_id"].is_string());
}

#[tokio::test]
async fn test_second_conversion_is_conflict() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let quote = app.create_quote(jane_doe()).await;
    let body = json!({ "quoteId": quote["id"] });

    let first = app
        .post("/api/shipments/from-quote", Some(&admin), body.clone())
        .await;
    let second = app
        .post("/api/shipments/from-quote", Some(&admin), body)
        .await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(app.backend.shipments().await.len(), 1);
}

#[tokio::test]
async fn test_closed_quote_cannot_be_converted() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let quote = app.create_quote(jane_doe()).await;
    let id = quote["id"].as_str().unwrap();
    app.patch(&format!("/api/quotes/{id}/close"), Some(&admin), json!({}))
        .await;

    let response = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": id }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(app.backend.shipments().await.is_empty());
}

#[tokio::test]
async fn test_convert_validates_quote_id() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let missing = app
        .post("/api/shipments/from-quote", Some(&admin), json!({}))
        .await;
    let malformed = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": "quote-1" }),
        )
        .await;
    let unknown = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": uuid::Uuid::new_v4() }),
        )
        .await;

    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["error"], "quoteId is required");
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conversion_without_id_is_server_error() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let quote = app.create_quote(jane_doe()).await;
    app.backend.convert_returns_no_id(true);

    let response = app
        .post(
            "/api/shipments/from-quote",
            Some(&admin),
            json!({ "quoteId": quote["id"] }),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["error"], "Internal server error");
}

// =============================================================================
// Status Updates
// =============================================================================

#[tokio::test]
async fn test_every_status_is_accepted() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let shipment = app.create_shipment(jane_doe()).await;
    let id = shipment["id"].as_str().unwrap();
    let mut updated_at = shipment["updated_at"].clone();

    for status in ShipmentStatus::ALL {
        let response = app
            .patch(
                &format!("/api/shipments/{id}/status"),
                Some(&admin),
                json!({ "status": status }),
            )
            .await;

        assert_eq!(response.status, StatusCode::OK, "{status}");
        assert_eq!(response.body["status"], status.as_str());
        assert_ne!(response.body["updated_at"], updated_at, "{status}");
        updated_at = response.body["updated_at"].clone();
    }
}

#[tokio::test]
async fn test_status_update_emails_customer() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let shipment = app.create_shipment(jane_doe()).await;
    let id = shipment["id"].as_str().unwrap();
    let reference = shipment["reference_id"].as_str().unwrap();
    // Quote intake already queued the alert and the confirmation.
    app.emails(2).await;

    app.patch(
        &format!("/api/shipments/{id}/status"),
        Some(&admin),
        json!({ "status": "Driver Assigned" }),
    )
    .await;

    let sent = app.emails(3).await;
    let update = sent
        .iter()
        .find(|e| e.subject.contains("Driver Assigned"))
        .unwrap();
    assert_eq!(update.to.as_str(), "jane@example.com");
    assert!(update.subject.contains(reference));
}

#[tokio::test]
async fn test_invalid_status_is_rejected_without_writing() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let shipment = app.create_shipment(jane_doe()).await;
    let id = shipment["id"].as_str().unwrap();
    let writes = app.backend.write_count();

    for body in [
        json!({ "status": "Lost" }),
        json!({ "status": "in transit" }),
        json!({}),
    ] {
        let response = app
            .patch(&format!("/api/shipments/{id}/status"), Some(&admin), body)
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], "Invalid status");
        assert_eq!(
            response.body["validStatuses"],
            json!(["Submitted", "Driver Assigned", "In Transit", "Delivered", "Cancelled"])
        );
    }

    assert_eq!(app.backend.write_count(), writes);
}

#[tokio::test]
async fn test_status_update_unknown_shipment_is_404() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let response = app
        .patch(
            &format!("/api/shipments/{}/status", uuid::Uuid::new_v4()),
            Some(&admin),
            json!({ "status": "Delivered" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Tracking
// =============================================================================

#[tokio::test]
async fn test_track_matches_email_case_insensitively() {
    let app = TestApp::new();
    let shipment = app.create_shipment(jane_doe()).await;
    let reference = shipment["reference_id"].as_str().unwrap();

    let response = app
        .get(
            &format!("/api/track?referenceId={reference}&email=JANE%40Example.COM"),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], shipment["id"]);
}

#[tokio::test]
async fn test_track_requires_matching_pair() {
    let app = TestApp::new();
    let shipment = app.create_shipment(jane_doe()).await;
    let reference = shipment["reference_id"].as_str().unwrap();

    let wrong_email = app
        .get(
            &format!("/api/track?referenceId={reference}&email=someone%40example.com"),
            None,
        )
        .await;
    let unknown = app
        .get("/api/track?referenceId=AH-NOPE0000&email=jane%40example.com", None)
        .await;

    assert_eq!(wrong_email.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(
        unknown.body["message"],
        "No shipment found for that reference ID and email"
    );
}

#[tokio::test]
async fn test_track_requires_both_parameters() {
    let app = TestApp::new();

    let response = app.get("/api/track?referenceId=AH-7K2M9QXD", None).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "referenceId and email are required");
}

// =============================================================================
// Client Feed
// =============================================================================

#[tokio::test]
async fn test_my_shipments_only_returns_own() {
    let app = TestApp::new();
    app.create_shipment(jane_doe()).await;
    app.create_shipment(quote_for("John", "john@example.com")).await;
    let jane = app.user(Some("JANE@example.com"), Some("client")).await;

    let response = app.get("/api/my-shipments", Some(&jane)).await;

    assert_eq!(response.status, StatusCode::OK);
    let shipments = response.body.as_array().unwrap();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0]["customer_email"], "jane@example.com");
}

#[tokio::test]
async fn test_my_shipments_without_email_is_empty() {
    let app = TestApp::new();
    app.create_shipment(jane_doe()).await;
    let token = app.user(None, Some("client")).await;

    let response = app.get("/api/my-shipments", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([]));
}
