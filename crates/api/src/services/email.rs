//! Outbound email: message rendering and delivery.
//!
//! Messages are rendered from Askama templates (HTML and plain text) and
//! handed to a [`Mailer`]. Delivery goes through the Resend HTTP API.
//!
//! A mailer never errors past its boundary: every attempt ends in a
//! [`MailOutcome`], and callers decide what a failure means.

use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

use autohaul_core::Email;

use crate::config::MailConfig;
use crate::services::notifications::{QuoteSummary, StatusChange};

/// Resend API endpoint.
const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Reported by [`DisabledMailer`].
pub const NOT_CONFIGURED: &str = "email delivery not configured";

/// HTML template for shipment status updates.
#[derive(Template)]
#[template(path = "email/status_update.html")]
struct StatusUpdateHtml<'a> {
    customer_name: &'a str,
    status: &'a str,
    order_id: &'a str,
}

/// Plain text template for shipment status updates.
#[derive(Template)]
#[template(path = "email/status_update.txt")]
struct StatusUpdateText<'a> {
    customer_name: &'a str,
    status: &'a str,
    order_id: &'a str,
}

/// HTML template for the internal new-quote alert.
#[derive(Template)]
#[template(path = "email/new_quote_alert.html")]
struct NewQuoteAlertHtml<'a> {
    quote: &'a QuoteSummary,
}

/// Plain text template for the internal new-quote alert.
#[derive(Template)]
#[template(path = "email/new_quote_alert.txt")]
struct NewQuoteAlertText<'a> {
    quote: &'a QuoteSummary,
}

/// HTML template for the customer's quote confirmation.
#[derive(Template)]
#[template(path = "email/quote_confirmation.html")]
struct QuoteConfirmationHtml<'a> {
    quote: &'a QuoteSummary,
}

/// Plain text template for the customer's quote confirmation.
#[derive(Template)]
#[template(path = "email/quote_confirmation.txt")]
struct QuoteConfirmationText<'a> {
    quote: &'a QuoteSummary,
}

/// Errors that can occur while rendering or sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the message.
    #[error("Provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: Email,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl OutboundEmail {
    /// Customer email announcing a shipment status change.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn status_update(change: &StatusChange) -> Result<Self, MailError> {
        let status = change.status.as_str();
        let html = StatusUpdateHtml {
            customer_name: &change.customer_name,
            status,
            order_id: &change.order_id,
        }
        .render()?;
        let text = StatusUpdateText {
            customer_name: &change.customer_name,
            status,
            order_id: &change.order_id,
        }
        .render()?;

        Ok(Self {
            to: change.customer_email.clone(),
            subject: format!("Shipment {} update: {status}", change.order_id),
            html,
            text,
        })
    }

    /// Internal alert for a newly submitted quote.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn new_quote_alert(to: Email, quote: &QuoteSummary) -> Result<Self, MailError> {
        Ok(Self {
            to,
            subject: format!(
                "New quote {}: {} {} {}",
                quote.reference(),
                quote.vehicle_year,
                quote.vehicle_make,
                quote.vehicle_model
            ),
            html: NewQuoteAlertHtml { quote }.render()?,
            text: NewQuoteAlertText { quote }.render()?,
        })
    }

    /// Confirmation sent to the customer who submitted a quote.
    ///
    /// # Errors
    ///
    /// Returns error if a template fails to render.
    pub fn quote_confirmation(quote: &QuoteSummary) -> Result<Self, MailError> {
        Ok(Self {
            to: quote.customer_email.clone(),
            subject: format!("We received your quote request ({})", quote.reference()),
            html: QuoteConfirmationHtml { quote }.render()?,
            text: QuoteConfirmationText { quote }.render()?,
        })
    }
}

/// Uniform result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MailOutcome {
    #[must_use]
    pub const fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Delivers rendered messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Attempt delivery once.
    async fn send(&self, email: &OutboundEmail) -> MailOutcome;
}

/// Build the mailer for a configuration.
///
/// Without an API key delivery is disabled rather than failing start-up.
///
/// # Errors
///
/// Returns error if the HTTP client fails to build.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.resend_api_key {
        Some(key) => Ok(Arc::new(ResendMailer::new(
            key.clone(),
            config.from_address.clone(),
        )?)),
        None => {
            tracing::warn!("RESEND_API_KEY not set, email delivery disabled");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

/// Request body for the Resend API.
#[derive(Serialize)]
struct ResendMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Mailer backed by the Resend HTTP API.
#[derive(Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: SecretString,
    from_address: String,
}

impl ResendMailer {
    /// Create a new Resend mailer.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(api_key: SecretString, from_address: String) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_key,
            from_address,
        })
    }

    async fn try_send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let body = ResendMessage {
            from: &self.from_address,
            to: [email.to.as_str()],
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(MailError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutboundEmail) -> MailOutcome {
        match self.try_send(email).await {
            Ok(()) => {
                tracing::info!(to = %email.to, subject = %email.subject, "Email sent successfully");
                MailOutcome::sent()
            }
            Err(e) => MailOutcome::failed(e.to_string()),
        }
    }
}

impl std::fmt::Debug for ResendMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendMailer")
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

/// Mailer used when no provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: &OutboundEmail) -> MailOutcome {
        tracing::info!(to = %email.to, subject = %email.subject, "Email delivery disabled, dropping message");
        MailOutcome::failed(NOT_CONFIGURED)
    }
}

/// Mailer that records every message instead of sending it.
///
/// Can be told to fail the next few attempts to exercise retries.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    inner: Arc<RecordingInner>,
}

#[derive(Debug, Default)]
struct RecordingInner {
    sent: Mutex<Vec<OutboundEmail>>,
    failures_remaining: Mutex<u32>,
    fail_recipient: Mutex<Option<String>>,
    notify: Notify,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` attempts.
    pub async fn fail_next(&self, count: u32) {
        *self.inner.failures_remaining.lock().await = count;
    }

    /// Fail every attempt addressed to `recipient`.
    pub async fn fail_recipient(&self, recipient: &str) {
        *self.inner.fail_recipient.lock().await = Some(recipient.to_lowercase());
    }

    /// Messages delivered so far.
    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.inner.sent.lock().await.clone()
    }

    /// Wait until at least `count` messages have been delivered.
    ///
    /// Returns whatever was delivered when `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutboundEmail> {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.inner.notify.notified();
                if self.inner.sent.lock().await.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent().await
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> MailOutcome {
        if let Some(recipient) = self.inner.fail_recipient.lock().await.as_deref() {
            if email.to.normalized() == recipient {
                return MailOutcome::failed("recipient rejected");
            }
        }

        {
            let mut remaining = self.inner.failures_remaining.lock().await;
            if *remaining > 0 {
                *remaining -= 1;
                return MailOutcome::failed("transient failure");
            }
        }

        self.inner.sent.lock().await.push(email.clone());
        self.inner.notify.notify_waiters();
        MailOutcome::sent()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use autohaul_core::ShipmentStatus;

    use super::*;

    fn summary() -> QuoteSummary {
        QuoteSummary {
            reference_id: Some("AH-7K2M9QXD".to_string()),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            customer_email: Email::parse("jane@example.com").unwrap(),
            customer_phone: Some("555-0100".to_string()),
            pickup_city: "Miami".to_string(),
            pickup_state: "FL".to_string(),
            delivery_city: "Dallas".to_string(),
            delivery_state: "TX".to_string(),
            vehicle_year: "2020".to_string(),
            vehicle_make: "Honda".to_string(),
            vehicle_model: "Accord".to_string(),
            transport_type: None,
            preferred_date: None,
        }
    }

    #[test]
    fn test_status_update_renders_both_parts() {
        let email = OutboundEmail::status_update(&StatusChange {
            customer_email: Email::parse("jane@example.com").unwrap(),
            customer_name: "Jane Doe".to_string(),
            status: ShipmentStatus::InTransit,
            order_id: "AH-7K2M9QXD".to_string(),
        })
        .unwrap();

        assert_eq!(email.to.as_str(), "jane@example.com");
        assert!(email.subject.contains("In Transit"));
        assert!(email.text.contains("Jane Doe"));
        assert!(email.text.contains("AH-7K2M9QXD"));
        assert!(email.html.contains("In Transit"));
    }

    #[test]
    fn test_html_escapes_customer_input() {
        let mut quote = summary();
        quote.first_name = "<script>".to_string();
        let email = OutboundEmail::quote_confirmation(&quote).unwrap();
        assert!(!email.html.contains("<script>"));
        assert!(email.text.contains("<script>"));
    }

    #[test]
    fn test_new_quote_alert_includes_route_and_vehicle() {
        let to = Email::parse("ops@autohaul.dev").unwrap();
        let email = OutboundEmail::new_quote_alert(to, &summary()).unwrap();
        assert!(email.subject.contains("AH-7K2M9QXD"));
        assert!(email.text.contains("Miami, FL"));
        assert!(email.text.contains("Dallas, TX"));
        assert!(email.text.contains("2020 Honda Accord"));
        assert!(email.text.contains("555-0100"));
    }

    #[tokio::test]
    async fn test_disabled_mailer_reports_not_configured() {
        let email = OutboundEmail::quote_confirmation(&summary()).unwrap();
        let outcome = DisabledMailer.send(&email).await;
        assert_eq!(outcome, MailOutcome::failed(NOT_CONFIGURED));
    }

    #[tokio::test]
    async fn test_recording_mailer_fails_then_records() {
        let mailer = RecordingMailer::new();
        mailer.fail_next(1).await;
        let email = OutboundEmail::quote_confirmation(&summary()).unwrap();

        assert!(!mailer.send(&email).await.success);
        assert!(mailer.send(&email).await.success);
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[test]
    fn test_outcome_serializes_without_null_error() {
        let json = serde_json::to_value(MailOutcome::sent()).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true }));
    }
}
