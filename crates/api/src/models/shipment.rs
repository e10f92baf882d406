//! Shipment records and the request bodies that act on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autohaul_core::{QuoteId, ReferenceId, ShipmentId, ShipmentStatus, UserId};

/// A shipment row as stored in the `shipments` table.
///
/// Rows are only ever created by the conversion procedure; `reference_id`
/// is copied from the source quote at that point and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: ShipmentId,
    pub reference_id: ReferenceId,
    #[serde(default)]
    pub quote_id: Option<QuoteId>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub pickup_city: String,
    pub pickup_state: String,
    #[serde(default)]
    pub pickup_zip: Option<String>,
    pub delivery_city: String,
    pub delivery_state: String,
    #[serde(default)]
    pub delivery_zip: Option<String>,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/shipments/from-quote`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuoteRequest {
    #[serde(default)]
    pub quote_id: Option<String>,
}

/// Body of `PATCH /api/shipments/{id}/status`.
///
/// Kept as a raw string so an unknown value is reported as an invalid
/// status with the allowed list, not as a JSON decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: Option<String>,
}
