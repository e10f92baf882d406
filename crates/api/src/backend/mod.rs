//! Managed backend seam.
//!
//! All business state lives in the managed backend: identity, the `profiles`,
//! `quotes` and `shipments` tables, and the `convert_quote_to_shipment`
//! procedure. This module defines the two traits the rest of the crate talks
//! to, plus two implementations:
//!
//! - [`SupabaseClient`] - the hosted backend over its REST endpoints
//! - [`MemoryBackend`] - an in-process stand-in for tests and local runs

pub mod memory;
pub mod supabase;

pub use memory::MemoryBackend;
pub use supabase::SupabaseClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use autohaul_core::{Email, QuoteId, ReferenceId, ShipmentId, ShipmentStatus, UserId};

use crate::models::{NewQuote, Quote, Shipment, User};

/// Errors returned by the managed backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure talking to the backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an unexpected error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The token or service key was not accepted.
    #[error("Unauthorized")]
    Unauthorized,

    /// A stored procedure refused the operation.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The addressed row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Token validation and role lookup.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a bearer token and return the user it belongs to.
    async fn user_for_token(&self, token: &str) -> Result<User, BackendError>;

    /// Read the raw `role` column of the user's profile.
    ///
    /// `Ok(None)` means the profile exists but carries no role, or there is
    /// no profile row at all.
    async fn profile_role(&self, user_id: UserId) -> Result<Option<String>, BackendError>;
}

/// Table and procedure access.
#[async_trait]
pub trait Database: Send + Sync {
    /// Insert a quote and return the stored row.
    async fn insert_quote(&self, quote: &NewQuote) -> Result<Quote, BackendError>;

    /// Every quote, newest first.
    async fn list_quotes(&self) -> Result<Vec<Quote>, BackendError>;

    /// Fetch one quote by id.
    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError>;

    /// Mark a quote closed unless it has already been converted.
    ///
    /// Returns `None` when no unconverted quote with this id exists.
    async fn close_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError>;

    /// Newest shipment matching a reference id and (case-insensitively) an email.
    async fn find_shipment_for_tracking(
        &self,
        reference_id: &ReferenceId,
        email: &Email,
    ) -> Result<Option<Shipment>, BackendError>;

    /// Every shipment, newest first.
    async fn list_shipments(&self) -> Result<Vec<Shipment>, BackendError>;

    /// Shipments whose customer email matches, case-insensitively, newest first.
    async fn list_shipments_for_email(&self, email: &Email)
    -> Result<Vec<Shipment>, BackendError>;

    /// Run the atomic conversion procedure.
    ///
    /// Returns the new shipment id, or `None` if the procedure completed
    /// without reporting one.
    async fn convert_quote_to_shipment(
        &self,
        quote_id: QuoteId,
    ) -> Result<Option<ShipmentId>, BackendError>;

    /// Fetch one shipment by id.
    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, BackendError>;

    /// Write `status` and `updated_at` together, returning the updated row.
    async fn update_shipment_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Shipment>, BackendError>;
}
