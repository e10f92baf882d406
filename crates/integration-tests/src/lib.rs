//! Integration tests for Autohaul.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p autohaul-integration-tests
//! ```
//!
//! Everything runs in-process: the API router is driven with
//! `tower::ServiceExt::oneshot` against the in-memory backend and a
//! recording mailer, so no managed backend or email provider is needed.
//!
//! # Test Categories
//!
//! - `api_gates` - 401/403 semantics and the client deny-list
//! - `api_quotes` - Quote intake, closing and new-quote emails
//! - `api_shipments` - Conversion, status updates, tracking and client feed
//! - `portal_session` - Session hydration, route guards and the typed client

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower::ServiceExt;

use autohaul_api::backend::MemoryBackend;
use autohaul_api::config::NotifyConfig;
use autohaul_api::services::{
    DispatchReport, IdentityResolver, NotificationQueue, OutboundEmail, RecordingMailer,
};
use autohaul_api::state::AppState;
use autohaul_core::Email;

/// Address internal new-quote alerts go to.
pub const ADMIN_ALERT_EMAIL: &str = "ops@autohaul.test";

/// How long tests wait for the notification worker.
pub const MAIL_WAIT: Duration = Duration::from_secs(5);

/// The API wired to in-memory collaborators.
pub struct TestApp {
    router: Router,
    pub backend: MemoryBackend,
    pub mailer: RecordingMailer,
    worker: JoinHandle<DispatchReport>,
}

/// Status and decoded JSON body of a response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    /// Start the API with an empty backend.
    #[must_use]
    pub fn new() -> Self {
        let backend = MemoryBackend::new();
        let mailer = RecordingMailer::new();
        let admin = Email::parse(ADMIN_ALERT_EMAIL).ok();

        let (queue, worker) =
            NotificationQueue::new(NotifyConfig::default(), Arc::new(mailer.clone()), admin);
        let worker = worker.with_backoff(Duration::ZERO).spawn();

        let state = AppState::new(
            IdentityResolver::new(Arc::new(backend.clone())),
            Arc::new(backend.clone()),
            queue,
        );

        Self {
            router: autohaul_api::app(state, &[]),
            backend,
            mailer,
            worker,
        }
    }

    /// The router, for serving over a real socket.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Register a user and return their bearer token.
    pub async fn user(&self, email: Option<&str>, role: Option<&str>) -> String {
        let token = format!("token-{}", uuid::Uuid::new_v4());
        self.backend.add_user(&token, email, role).await;
        token
    }

    /// Register a staff user and return their bearer token.
    pub async fn admin(&self) -> String {
        self.user(Some("admin@autohaul.test"), Some("admin")).await
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    /// Submit a quote and return the created record.
    pub async fn create_quote(&self, body: Value) -> Value {
        let response = self.post("/api/quotes", None, body).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }

    /// Submit a quote and convert it, returning the shipment.
    pub async fn create_shipment(&self, quote: Value) -> Value {
        let admin = self.admin().await;
        let quote = self.create_quote(quote).await;
        let response = self
            .post(
                "/api/shipments/from-quote",
                Some(&admin),
                json!({ "quoteId": quote["id"] }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body
    }

    /// Wait for at least `count` delivered emails.
    pub async fn emails(&self, count: usize) -> Vec<OutboundEmail> {
        self.mailer.wait_for(count, MAIL_WAIT).await
    }

    /// Stop accepting notifications and wait for the worker to drain.
    pub async fn shutdown(self) -> DispatchReport {
        drop(self.router);
        tokio::time::timeout(MAIL_WAIT, self.worker)
            .await
            .unwrap()
            .unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// The sample quote from the public form.
#[must_use]
pub fn jane_doe() -> Value {
    json!({
        "firstName": "Jane",
        "lastName": "Doe",
        "customerEmail": "jane@example.com",
        "pickupCity": "Miami",
        "pickupState": "FL",
        "deliveryCity": "Dallas",
        "deliveryState": "TX",
        "vehicleYear": "2020",
        "vehicleMake": "Honda",
        "vehicleModel": "Accord"
    })
}

/// A quote for another customer.
#[must_use]
pub fn quote_for(first_name: &str, email: &str) -> Value {
    let mut quote = jane_doe();
    quote["firstName"] = json!(first_name);
    quote["customerEmail"] = json!(email);
    quote
}
