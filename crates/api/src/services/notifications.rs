//! Outbound notification queue and delivery worker.
//!
//! Request handlers never send email themselves. They describe what
//! happened as a [`Notification`] and hand it to the [`NotificationQueue`],
//! which never blocks. A single [`NotificationWorker`] task drains the queue,
//! renders messages, and delivers them through the configured [`Mailer`],
//! retrying failed attempts with linear backoff.
//!
//! Delivery is best effort: a failure is logged and counted in the
//! [`DispatchReport`], and never reaches the request that caused it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use autohaul_core::{Email, ShipmentStatus};

use crate::config::NotifyConfig;
use crate::models::{NewQuote, Quote, Shipment, TransportType};
use crate::services::email::{Mailer, OutboundEmail};

/// Delay unit between attempts; attempt `n` waits `n` units.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Errors from handing a notification to the queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// The queue is at capacity.
    #[error("notification queue is full")]
    QueueFull,

    /// The worker has stopped.
    #[error("notification queue is closed")]
    QueueClosed,
}

/// A shipment status change to announce to the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub customer_email: Email,
    pub customer_name: String,
    pub status: ShipmentStatus,
    /// Customer-facing order reference.
    pub order_id: String,
}

impl StatusChange {
    /// Describe a shipment's current status.
    ///
    /// Returns `None` when the stored customer email is not deliverable.
    #[must_use]
    pub fn for_shipment(shipment: &Shipment) -> Option<Self> {
        let customer_email = Email::parse(&shipment.customer_email).ok()?;
        Some(Self {
            customer_email,
            customer_name: shipment.customer_name.clone(),
            status: shipment.status,
            order_id: shipment.reference_id.to_string(),
        })
    }
}

/// The parts of a quote both new-quote emails need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteSummary {
    pub reference_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub customer_email: Email,
    pub customer_phone: Option<String>,
    pub pickup_city: String,
    pub pickup_state: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub transport_type: Option<TransportType>,
    pub preferred_date: Option<NaiveDate>,
}

impl QuoteSummary {
    /// Summarize a stored quote.
    ///
    /// Returns `None` when the stored customer email is not deliverable.
    #[must_use]
    pub fn for_quote(quote: &Quote) -> Option<Self> {
        let customer_email = Email::parse(&quote.customer_email).ok()?;
        Some(Self {
            reference_id: Some(quote.reference_id.to_string()),
            first_name: quote.first_name.clone(),
            last_name: quote.last_name.clone(),
            customer_email,
            customer_phone: quote.customer_phone.clone(),
            pickup_city: quote.pickup_city.clone(),
            pickup_state: quote.pickup_state.clone(),
            delivery_city: quote.delivery_city.clone(),
            delivery_state: quote.delivery_state.clone(),
            vehicle_year: quote.vehicle_year.clone(),
            vehicle_make: quote.vehicle_make.clone(),
            vehicle_model: quote.vehicle_model.clone(),
            transport_type: quote.transport_type,
            preferred_date: quote.preferred_date,
        })
    }

    /// Summarize a validated intake that has not been stored by this service.
    #[must_use]
    pub fn for_new_quote(quote: &NewQuote, reference_id: Option<String>) -> Self {
        Self {
            reference_id,
            first_name: quote.first_name.clone(),
            last_name: quote.last_name.clone(),
            customer_email: quote.customer_email.clone(),
            customer_phone: quote.customer_phone.clone(),
            pickup_city: quote.pickup_city.clone(),
            pickup_state: quote.pickup_state.clone(),
            delivery_city: quote.delivery_city.clone(),
            delivery_state: quote.delivery_state.clone(),
            vehicle_year: quote.vehicle_year.clone(),
            vehicle_make: quote.vehicle_make.clone(),
            vehicle_model: quote.vehicle_model.clone(),
            transport_type: quote.transport_type,
            preferred_date: quote.preferred_date,
        }
    }

    /// Reference id, or a placeholder for quotes announced before storage.
    #[must_use]
    pub fn reference(&self) -> &str {
        self.reference_id.as_deref().unwrap_or("(pending)")
    }

    #[must_use]
    pub fn customer_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    #[must_use]
    pub fn pickup(&self) -> String {
        format!("{}, {}", self.pickup_city, self.pickup_state)
    }

    #[must_use]
    pub fn delivery(&self) -> String {
        format!("{}, {}", self.delivery_city, self.delivery_state)
    }

    #[must_use]
    pub fn vehicle(&self) -> String {
        format!(
            "{} {} {}",
            self.vehicle_year, self.vehicle_make, self.vehicle_model
        )
    }

    #[must_use]
    pub fn phone(&self) -> &str {
        self.customer_phone.as_deref().unwrap_or("not provided")
    }

    #[must_use]
    pub const fn transport(&self) -> &'static str {
        match self.transport_type {
            Some(TransportType::Open) => "Open",
            Some(TransportType::Enclosed) => "Enclosed",
            None => "No preference",
        }
    }

    #[must_use]
    pub fn preferred_date(&self) -> String {
        self.preferred_date
            .map_or_else(|| "Flexible".to_string(), |d| d.format("%B %-d, %Y").to_string())
    }
}

/// Something that happened which customers or staff should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A shipment's status changed; emails the customer.
    StatusChanged(StatusChange),
    /// A quote was submitted; emails staff and the customer.
    NewQuote(QuoteSummary),
}

impl Notification {
    const fn kind(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "status_changed",
            Self::NewQuote(_) => "new_quote",
        }
    }
}

/// Producer handle for the notification queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Create a queue and the worker that drains it.
    ///
    /// The worker is returned unstarted; call [`NotificationWorker::spawn`].
    #[must_use]
    pub fn new(
        config: NotifyConfig,
        mailer: Arc<dyn Mailer>,
        admin_alert_email: Option<Email>,
    ) -> (Self, NotificationWorker) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = NotificationWorker {
            rx,
            mailer,
            admin_alert_email,
            max_attempts: config.max_attempts.max(1),
            backoff: DEFAULT_RETRY_BACKOFF,
            stats: Arc::new(DispatchStats::default()),
        };
        (Self { tx }, worker)
    }

    /// Queue a notification without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::QueueFull`] at capacity and
    /// [`NotifyError::QueueClosed`] once the worker has stopped.
    pub fn enqueue(&self, notification: Notification) -> Result<(), NotifyError> {
        let kind = notification.kind();
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
        })?;
        tracing::debug!(kind, "Notification queued");
        Ok(())
    }
}

/// Delivery counters shared between the worker and observers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    skipped: AtomicU64,
}

impl DispatchStats {
    /// Snapshot the counters.
    #[must_use]
    pub fn report(&self) -> DispatchReport {
        DispatchReport {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages accepted by the mailer.
    pub delivered: u64,
    /// Messages given up on after the last attempt.
    pub failed: u64,
    /// Attempts that failed and were tried again.
    pub retried: u64,
    /// Messages never attempted (no recipient configured, render failure).
    pub skipped: u64,
}

/// Drains the notification queue.
pub struct NotificationWorker {
    rx: mpsc::Receiver<Notification>,
    mailer: Arc<dyn Mailer>,
    admin_alert_email: Option<Email>,
    max_attempts: u32,
    backoff: Duration,
    stats: Arc<DispatchStats>,
}

impl NotificationWorker {
    /// Override the retry backoff unit.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shared counters, readable while the worker runs.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Run on the Tokio runtime until every queue handle is dropped.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }

    /// Process notifications until every queue handle is dropped.
    pub async fn run(mut self) -> DispatchReport {
        tracing::info!(max_attempts = self.max_attempts, "Notification worker started");
        while let Some(notification) = self.rx.recv().await {
            self.dispatch(notification).await;
        }
        let report = self.stats.report();
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            retried = report.retried,
            skipped = report.skipped,
            "Notification worker stopped"
        );
        report
    }

    async fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::StatusChanged(change) => {
                let email = OutboundEmail::status_update(&change);
                self.deliver_rendered("status_update", email).await;
            }
            Notification::NewQuote(quote) => {
                // Two independent messages; neither outcome affects the other.
                let alert = async {
                    match &self.admin_alert_email {
                        Some(to) => {
                            let email = OutboundEmail::new_quote_alert(to.clone(), &quote);
                            self.deliver_rendered("new_quote_alert", email).await;
                        }
                        None => {
                            tracing::warn!(
                                reference_id = quote.reference(),
                                "ADMIN_ALERT_EMAIL not set, skipping new-quote alert"
                            );
                            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                };
                let confirmation = async {
                    let email = OutboundEmail::quote_confirmation(&quote);
                    self.deliver_rendered("quote_confirmation", email).await;
                };
                tokio::join!(alert, confirmation);
            }
        }
    }

    async fn deliver_rendered(
        &self,
        template: &'static str,
        rendered: Result<OutboundEmail, crate::services::email::MailError>,
    ) {
        match rendered {
            Ok(email) => self.deliver(template, &email).await,
            Err(e) => {
                tracing::error!(template, error = %e, "Failed to render email");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn deliver(&self, template: &'static str, email: &OutboundEmail) {
        for attempt in 1..=self.max_attempts {
            let outcome = self.mailer.send(email).await;
            if outcome.success {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }

            let error = outcome.error.as_deref().unwrap_or("unknown error");
            if attempt == self.max_attempts {
                tracing::error!(
                    template,
                    to = %email.to,
                    attempts = attempt,
                    error,
                    "Email delivery failed"
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }

            tracing::warn!(template, to = %email.to, attempt, error, "Email attempt failed, retrying");
            self.stats.retried.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

impl std::fmt::Debug for NotificationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationWorker")
            .field("admin_alert_email", &self.admin_alert_email)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
