//! Records as the API returns them, and the bodies the portal sends.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use autohaul_core::{QuoteId, QuoteStatus, ReferenceId, ShipmentId, ShipmentStatus, UserId};

/// A stored quote.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub reference_id: ReferenceId,
    pub first_name: String,
    pub last_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub pickup_city: String,
    pub pickup_state: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    #[serde(default)]
    pub transport_type: Option<String>,
    #[serde(default)]
    pub preferred_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub quote_status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}

/// Response to a quote submission: the stored quote and its `referenceId`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedQuote {
    #[serde(flatten)]
    pub quote: Quote,
    #[serde(rename = "referenceId")]
    pub reference: ReferenceId,
}

/// A shipment as shown in the portal and the back office.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub reference_id: ReferenceId,
    #[serde(default)]
    pub quote_id: Option<QuoteId>,
    pub customer_name: String,
    pub customer_email: String,
    pub pickup_city: String,
    pub pickup_state: String,
    pub delivery_city: String,
    pub delivery_state: String,
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

/// The public quote form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSubmission {
    pub first_name: String,
    pub last_name: String,
    pub customer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub pickup_city: String,
    pub pickup_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_zip: Option<String>,
    pub delivery_city: String,
    pub delivery_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_zip: Option<String>,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Body of the status-change email trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusNotice {
    pub customer_email: String,
    pub customer_name: String,
    pub status: ShipmentStatus,
    pub order_id: String,
}

impl StatusNotice {
    /// The notice for a shipment's current status.
    #[must_use]
    pub fn for_shipment(shipment: &Shipment) -> Self {
        Self {
            customer_email: shipment.customer_email.clone(),
            customer_name: shipment.customer_name.clone(),
            status: shipment.status,
            order_id: shipment.reference_id.to_string(),
        }
    }
}

/// `GET /api/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_uses_camel_case_and_skips_empty() {
        let submission = QuoteSubmission {
            first_name: "Jane".to_string(),
            vehicle_year: "2020".to_string(),
            ..QuoteSubmission::default()
        };
        let value = serde_json::to_value(&submission).unwrap();

        assert_eq!(value["firstName"], "Jane");
        assert_eq!(value["vehicleYear"], "2020");
        assert!(value.get("customerPhone").is_none());
        assert!(value.get("first_name").is_none());
    }

    #[test]
    fn test_created_quote_reads_alias() {
        let created: CreatedQuote = serde_json::from_value(serde_json::json!({
            "id": "3f1c2a8e-5b7d-4c1e-9a2b-6d8e0f1a2b3c",
            "reference_id": "AH-7K2M9QXD",
            "referenceId": "AH-7K2M9QXD",
            "first_name": "Jane",
            "last_name": "Doe",
            "customer_email": "jane@example.com",
            "pickup_city": "Miami",
            "pickup_state": "FL",
            "delivery_city": "Dallas",
            "delivery_state": "TX",
            "vehicle_year": "2020",
            "vehicle_make": "Honda",
            "vehicle_model": "Accord",
            "quote_status": "new",
            "created_at": "2026-01-05T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(created.reference.as_str(), "AH-7K2M9QXD");
        assert_eq!(created.quote.reference_id, created.reference);
        assert_eq!(created.quote.quote_status, QuoteStatus::New);
    }
}
