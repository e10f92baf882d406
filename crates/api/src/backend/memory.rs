//! In-memory managed backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use autohaul_core::{
    Email, QuoteId, QuoteStatus, ReferenceId, ShipmentId, ShipmentStatus, UserId,
};

use super::{BackendError, Database, IdentityProvider};
use crate::models::{NewQuote, Quote, Shipment, User};

/// In-memory stand-in for the managed backend.
///
/// Holds tokens, profiles, quotes and shipments behind one lock and runs
/// the conversion procedure atomically under it. Suitable for tests and
/// local development; nothing is persisted.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: RwLock<MemoryState>,
    writes: AtomicU64,
    fail_profile_lookups: AtomicBool,
    convert_returns_no_id: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Bearer token to user.
    sessions: HashMap<String, User>,
    /// Raw profile role per user.
    profiles: HashMap<UserId, Option<String>>,
    quotes: Vec<Quote>,
    shipments: Vec<Shipment>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Current time, strictly later than any timestamp handed out before.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn user_id_for_email(&self, email: &str) -> Option<UserId> {
        let wanted = email.trim().to_lowercase();
        self.sessions
            .values()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.trim().to_lowercase() == wanted)
            })
            .map(|u| u.id)
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user reachable via `token`, with a raw profile role.
    pub async fn add_user(&self, token: &str, email: Option<&str>, role: Option<&str>) -> User {
        let user = User {
            id: UserId::random(),
            email: email.map(str::to_string),
            user_metadata: serde_json::Value::Null,
        };
        let mut state = self.inner.state.write().await;
        state.sessions.insert(token.to_string(), user.clone());
        state.profiles.insert(user.id, role.map(str::to_string));
        user
    }

    /// Overwrite a user's raw profile role.
    pub async fn set_role(&self, user_id: UserId, role: Option<&str>) {
        let mut state = self.inner.state.write().await;
        state.profiles.insert(user_id, role.map(str::to_string));
    }

    /// Make every profile lookup fail until reset.
    pub fn fail_profile_lookups(&self, fail: bool) {
        self.inner
            .fail_profile_lookups
            .store(fail, Ordering::SeqCst);
    }

    /// Make the conversion procedure succeed without reporting an id.
    pub fn convert_returns_no_id(&self, enabled: bool) {
        self.inner
            .convert_returns_no_id
            .store(enabled, Ordering::SeqCst);
    }

    /// Insert a shipment row directly, bypassing the conversion procedure.
    pub async fn insert_shipment(&self, shipment: Shipment) {
        let mut state = self.inner.state.write().await;
        state.shipments.push(shipment);
        self.record_write();
    }

    /// Number of mutations applied so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every quote, in insertion order.
    pub async fn quotes(&self) -> Vec<Quote> {
        self.inner.state.read().await.quotes.clone()
    }

    /// Snapshot of every shipment, in insertion order.
    pub async fn shipments(&self) -> Vec<Shipment> {
        self.inner.state.read().await.shipments.clone()
    }

    fn record_write(&self) {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn user_for_token(&self, token: &str) -> Result<User, BackendError> {
        self.inner
            .state
            .read()
            .await
            .sessions
            .get(token)
            .cloned()
            .ok_or(BackendError::Unauthorized)
    }

    async fn profile_role(&self, user_id: UserId) -> Result<Option<String>, BackendError> {
        if self.inner.fail_profile_lookups.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "profiles unavailable".to_string(),
            });
        }
        Ok(self
            .inner
            .state
            .read()
            .await
            .profiles
            .get(&user_id)
            .cloned()
            .flatten())
    }
}

#[async_trait]
impl Database for MemoryBackend {
    async fn insert_quote(&self, quote: &NewQuote) -> Result<Quote, BackendError> {
        let mut state = self.inner.state.write().await;
        let created_at = state.next_timestamp();
        let stored = Quote {
            id: QuoteId::random(),
            reference_id: quote.reference_id.clone(),
            first_name: quote.first_name.clone(),
            last_name: quote.last_name.clone(),
            customer_email: quote.customer_email.to_string(),
            customer_phone: quote.customer_phone.clone(),
            pickup_city: quote.pickup_city.clone(),
            pickup_state: quote.pickup_state.clone(),
            pickup_zip: quote.pickup_zip.clone(),
            delivery_city: quote.delivery_city.clone(),
            delivery_state: quote.delivery_state.clone(),
            delivery_zip: quote.delivery_zip.clone(),
            vehicle_year: quote.vehicle_year.clone(),
            vehicle_make: quote.vehicle_make.clone(),
            vehicle_model: quote.vehicle_model.clone(),
            vehicle_type: quote.vehicle_type.clone(),
            transport_type: quote.transport_type,
            operable: quote.operable,
            preferred_date: quote.preferred_date,
            notes: quote.notes.clone(),
            quote_status: quote.quote_status,
            created_at,
        };
        state.quotes.push(stored.clone());
        self.record_write();
        Ok(stored)
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, BackendError> {
        let quotes = self.inner.state.read().await.quotes.clone();
        Ok(newest_first(quotes, |q| q.created_at))
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError> {
        let state = self.inner.state.read().await;
        Ok(state.quotes.iter().find(|q| q.id == id).cloned())
    }

    async fn close_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError> {
        let mut state = self.inner.state.write().await;
        let Some(quote) = state
            .quotes
            .iter_mut()
            .find(|q| q.id == id && q.quote_status != QuoteStatus::Converted)
        else {
            return Ok(None);
        };
        quote.quote_status = QuoteStatus::Closed;
        let closed = quote.clone();
        self.record_write();
        Ok(Some(closed))
    }

    async fn find_shipment_for_tracking(
        &self,
        reference_id: &ReferenceId,
        email: &Email,
    ) -> Result<Option<Shipment>, BackendError> {
        let state = self.inner.state.read().await;
        Ok(state
            .shipments
            .iter()
            .filter(|s| &s.reference_id == reference_id && email.eq_ignore_case(&s.customer_email))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn list_shipments(&self) -> Result<Vec<Shipment>, BackendError> {
        let shipments = self.inner.state.read().await.shipments.clone();
        Ok(newest_first(shipments, |s| s.created_at))
    }

    async fn list_shipments_for_email(
        &self,
        email: &Email,
    ) -> Result<Vec<Shipment>, BackendError> {
        let shipments: Vec<Shipment> = self
            .inner
            .state
            .read()
            .await
            .shipments
            .iter()
            .filter(|s| email.eq_ignore_case(&s.customer_email))
            .cloned()
            .collect();
        Ok(newest_first(shipments, |s| s.created_at))
    }

    async fn convert_quote_to_shipment(
        &self,
        quote_id: QuoteId,
    ) -> Result<Option<ShipmentId>, BackendError> {
        let mut state = self.inner.state.write().await;

        let quote = state
            .quotes
            .iter()
            .find(|q| q.id == quote_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound("Quote not found".to_string()))?;
        match quote.quote_status {
            QuoteStatus::New => {}
            QuoteStatus::Converted => {
                return Err(BackendError::Rejected("Quote already converted".to_string()));
            }
            QuoteStatus::Closed => {
                return Err(BackendError::Rejected("Quote is closed".to_string()));
            }
        }

        let now = state.next_timestamp();
        let shipment = Shipment {
            id: ShipmentId::random(),
            reference_id: quote.reference_id.clone(),
            quote_id: Some(quote.id),
            customer_name: quote.customer_name(),
            customer_email: quote.customer_email.clone(),
            customer_phone: quote.customer_phone.clone(),
            pickup_city: quote.pickup_city.clone(),
            pickup_state: quote.pickup_state.clone(),
            pickup_zip: quote.pickup_zip.clone(),
            delivery_city: quote.delivery_city.clone(),
            delivery_state: quote.delivery_state.clone(),
            delivery_zip: quote.delivery_zip.clone(),
            vehicle_year: quote.vehicle_year.clone(),
            vehicle_make: quote.vehicle_make.clone(),
            vehicle_model: quote.vehicle_model.clone(),
            status: ShipmentStatus::Submitted,
            eta: None,
            user_id: state.user_id_for_email(&quote.customer_email),
            created_at: now,
            updated_at: now,
        };
        let shipment_id = shipment.id;

        if let Some(stored) = state.quotes.iter_mut().find(|q| q.id == quote_id) {
            stored.quote_status = QuoteStatus::Converted;
        }
        state.shipments.push(shipment);
        self.record_write();

        if self.inner.convert_returns_no_id.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(shipment_id))
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, BackendError> {
        let state = self.inner.state.read().await;
        Ok(state.shipments.iter().find(|s| s.id == id).cloned())
    }

    async fn update_shipment_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Shipment>, BackendError> {
        let mut state = self.inner.state.write().await;
        // Keep updated_at strictly increasing even if the caller's clock ties.
        let floor = state.next_timestamp();
        let Some(shipment) = state.shipments.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        shipment.status = status;
        shipment.updated_at = updated_at.max(floor);
        let updated = shipment.clone();
        self.record_write();
        Ok(Some(updated))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::QuoteIntake;

    fn new_quote(email: &str) -> NewQuote {
        let intake: QuoteIntake = serde_json::from_value(serde_json::json!({
            "firstName": "Jane",
            "lastName": "Doe",
            "customerEmail": email,
            "pickupCity": "Miami",
            "pickupState": "FL",
            "deliveryCity": "Dallas",
            "deliveryState": "TX",
            "vehicleYear": "2020",
            "vehicleMake": "Honda",
            "vehicleModel": "Accord"
        }))
        .unwrap();
        intake.into_new_quote().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.user_for_token("nope").await,
            Err(BackendError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_profile_role_and_failure_toggle() {
        let backend = MemoryBackend::new();
        let user = backend.add_user("t", Some("a@b.co"), Some("Admin")).await;
        assert_eq!(
            backend.profile_role(user.id).await.unwrap().as_deref(),
            Some("Admin")
        );

        backend.fail_profile_lookups(true);
        assert!(backend.profile_role(user.id).await.is_err());
    }

    #[tokio::test]
    async fn test_conversion_is_single_shot() {
        let backend = MemoryBackend::new();
        let quote = backend.insert_quote(&new_quote("jane@example.com")).await.unwrap();

        let first = backend.convert_quote_to_shipment(quote.id).await.unwrap();
        let shipment = backend.get_shipment(first.unwrap()).await.unwrap().unwrap();
        assert_eq!(shipment.reference_id, quote.reference_id);
        assert_eq!(shipment.customer_name, "Jane Doe");
        assert_eq!(shipment.status, ShipmentStatus::Submitted);

        let second = backend.convert_quote_to_shipment(quote.id).await;
        assert!(matches!(second, Err(BackendError::Rejected(_))));
        assert_eq!(backend.shipments().await.len(), 1);

        let stored = backend.get_quote(quote.id).await.unwrap().unwrap();
        assert_eq!(stored.quote_status, QuoteStatus::Converted);
    }

    #[tokio::test]
    async fn test_conversion_links_matching_user() {
        let backend = MemoryBackend::new();
        let user = backend.add_user("t", Some("JANE@example.com"), Some("client")).await;
        let quote = backend.insert_quote(&new_quote("jane@example.com")).await.unwrap();
        let id = backend.convert_quote_to_shipment(quote.id).await.unwrap().unwrap();
        let shipment = backend.get_shipment(id).await.unwrap().unwrap();
        assert_eq!(shipment.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn test_email_matching_folds_non_ascii() {
        let backend = MemoryBackend::new();
        let user = backend.add_user("t", Some("ÉLODIE@café.fr"), Some("client")).await;
        let quote = backend.insert_quote(&new_quote("Élodie@Café.fr")).await.unwrap();
        let id = backend.convert_quote_to_shipment(quote.id).await.unwrap().unwrap();

        let shipment = backend.get_shipment(id).await.unwrap().unwrap();
        assert_eq!(shipment.user_id, Some(user.id));

        let email = Email::parse("élodie@CAFÉ.fr").unwrap();
        let mine = backend.list_shipments_for_email(&email).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(
            backend
                .find_shipment_for_tracking(&shipment.reference_id, &email)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_conversion_of_missing_quote() {
        let backend = MemoryBackend::new();
        let result = backend.convert_quote_to_shipment(QuoteId::random()).await;
        assert!(matches!(result, Err(BackendError::NotFound(_))));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_close_skips_converted_quotes() {
        let backend = MemoryBackend::new();
        let open = backend.insert_quote(&new_quote("a@example.com")).await.unwrap();
        let converted = backend.insert_quote(&new_quote("b@example.com")).await.unwrap();
        backend.convert_quote_to_shipment(converted.id).await.unwrap();

        let closed = backend.close_quote(open.id).await.unwrap().unwrap();
        assert_eq!(closed.quote_status, QuoteStatus::Closed);
        assert!(backend.close_quote(converted.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let backend = MemoryBackend::new();
        let older = backend.insert_quote(&new_quote("a@example.com")).await.unwrap();
        let newer = backend.insert_quote(&new_quote("b@example.com")).await.unwrap();
        let ids: Vec<QuoteId> = backend
            .list_quotes()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_status_update_advances_updated_at() {
        let backend = MemoryBackend::new();
        let quote = backend.insert_quote(&new_quote("jane@example.com")).await.unwrap();
        let id = backend.convert_quote_to_shipment(quote.id).await.unwrap().unwrap();
        let before = backend.get_shipment(id).await.unwrap().unwrap().updated_at;

        let updated = backend
            .update_shipment_status(id, ShipmentStatus::InTransit, before)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ShipmentStatus::InTransit);
        assert!(updated.updated_at > before);
    }
}
