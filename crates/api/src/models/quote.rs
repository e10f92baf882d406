//! Quote intake and stored quote records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use autohaul_core::{Email, QUOTE_REFERENCE_PREFIX, QuoteId, QuoteStatus, ReferenceId};

/// Trailer type requested for the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Open,
    Enclosed,
}

/// A quote row as stored in the `quotes` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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
    #[serde(default)]
    pub pickup_zip: Option<String>,
    pub delivery_city: String,
    pub delivery_state: String,
    #[serde(default)]
    pub delivery_zip: Option<String>,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub transport_type: Option<TransportType>,
    #[serde(default)]
    pub operable: Option<bool>,
    #[serde(default)]
    pub preferred_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub quote_status: QuoteStatus,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// Customer's full name.
    #[must_use]
    pub fn customer_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Insert payload for the `quotes` table.
///
/// Id and `created_at` are assigned by the store; the reference id is
/// generated here so the caller can show it immediately.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewQuote {
    pub reference_id: ReferenceId,
    pub first_name: String,
    pub last_name: String,
    pub customer_email: Email,
    pub customer_phone: Option<String>,
    pub pickup_city: String,
    pub pickup_state: String,
    pub pickup_zip: Option<String>,
    pub delivery_city: String,
    pub delivery_state: String,
    pub delivery_zip: Option<String>,
    pub vehicle_year: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_type: Option<String>,
    pub transport_type: Option<TransportType>,
    pub operable: Option<bool>,
    pub preferred_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub quote_status: QuoteStatus,
}

/// Public quote intake payload, as posted by the marketing site.
///
/// Every field is optional at the type level so missing fields can be
/// reported together as a validation error instead of a decode failure.
/// Numeric inputs (e.g. `vehicleYear: 2020`) are accepted as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteIntake {
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pickup_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pickup_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pickup_zip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delivery_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delivery_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delivery_zip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vehicle_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vehicle_make: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vehicle_model: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vehicle_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transport_type: Option<String>,
    #[serde(default)]
    pub operable: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub preferred_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
}

impl QuoteIntake {
    /// Validate the intake and map it onto the storage schema.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming every missing required field,
    /// or the first malformed optional field.
    pub fn into_new_quote(self) -> Result<NewQuote, String> {
        let required = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("customerEmail", &self.customer_email),
            ("pickupCity", &self.pickup_city),
            ("pickupState", &self.pickup_state),
            ("deliveryCity", &self.delivery_city),
            ("deliveryState", &self.delivery_state),
            ("vehicleYear", &self.vehicle_year),
            ("vehicleMake", &self.vehicle_make),
            ("vehicleModel", &self.vehicle_model),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}", missing.join(", ")));
        }

        let customer_email = Email::parse(self.customer_email.as_deref().unwrap_or_default())
            .map_err(|e| format!("Invalid customerEmail: {e}"))?;

        let transport_type = match self.transport_type.as_deref().map(str::to_lowercase) {
            None => None,
            Some(t) if t == "open" => Some(TransportType::Open),
            Some(t) if t == "enclosed" => Some(TransportType::Enclosed),
            Some(other) => return Err(format!("Invalid transportType: {other}")),
        };

        let preferred_date = self
            .preferred_date
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .map_err(|_| "Invalid preferredDate, expected YYYY-MM-DD".to_string())?;

        Ok(NewQuote {
            reference_id: ReferenceId::generate(QUOTE_REFERENCE_PREFIX),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            customer_email,
            customer_phone: self.customer_phone,
            pickup_city: self.pickup_city.unwrap_or_default(),
            pickup_state: self.pickup_state.unwrap_or_default(),
            pickup_zip: self.pickup_zip,
            delivery_city: self.delivery_city.unwrap_or_default(),
            delivery_state: self.delivery_state.unwrap_or_default(),
            delivery_zip: self.delivery_zip,
            vehicle_year: self.vehicle_year.unwrap_or_default(),
            vehicle_make: self.vehicle_make.unwrap_or_default(),
            vehicle_model: self.vehicle_model.unwrap_or_default(),
            vehicle_type: self.vehicle_type,
            transport_type,
            operable: self.operable,
            preferred_date,
            notes: self.notes,
            quote_status: QuoteStatus::New,
        })
    }
}

/// Response for a created quote: the stored row plus a camelCase
/// `referenceId` alias for the browser.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteCreated {
    #[serde(flatten)]
    pub quote: Quote,
    #[serde(rename = "referenceId")]
    pub reference_id_alias: ReferenceId,
}

impl From<Quote> for QuoteCreated {
    fn from(quote: Quote) -> Self {
        let reference_id_alias = quote.reference_id.clone();
        Self {
            quote,
            reference_id_alias,
        }
    }
}

/// Accept strings or numbers; trim, and treat blank as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a string, got {other}"
            )));
        }
    };
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jane() -> serde_json::Value {
        serde_json::json!({
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

    #[test]
    fn test_intake_maps_to_snake_case_schema() {
        let intake: QuoteIntake = serde_json::from_value(jane()).unwrap();
        let quote = intake.into_new_quote().unwrap();
        let json = serde_json::to_value(&quote).unwrap();

        assert_eq!(json["first_name"], "Jane");
        assert_eq!(json["customer_email"], "jane@example.com");
        assert_eq!(json["pickup_city"], "Miami");
        assert_eq!(json["vehicle_model"], "Accord");
        assert_eq!(json["quote_status"], "new");
        assert!(json["reference_id"].as_str().unwrap().starts_with("AH-"));
    }

    #[test]
    fn test_intake_reports_all_missing_fields() {
        let intake: QuoteIntake =
            serde_json::from_value(serde_json::json!({"firstName": "Jane", "pickupCity": "  "}))
                .unwrap();
        let err = intake.into_new_quote().unwrap_err();
        assert!(err.contains("lastName"));
        assert!(err.contains("pickupCity"));
        assert!(err.contains("vehicleModel"));
        assert!(!err.contains("firstName"));
    }

    #[test]
    fn test_intake_accepts_numeric_year() {
        let mut body = jane();
        body["vehicleYear"] = serde_json::json!(2020);
        let intake: QuoteIntake = serde_json::from_value(body).unwrap();
        assert_eq!(intake.into_new_quote().unwrap().vehicle_year, "2020");
    }

    #[test]
    fn test_intake_rejects_bad_email_and_transport() {
        let mut body = jane();
        body["customerEmail"] = serde_json::json!("jane-at-example");
        let intake: QuoteIntake = serde_json::from_value(body).unwrap();
        assert!(intake.into_new_quote().unwrap_err().contains("customerEmail"));

        let mut body = jane();
        body["transportType"] = serde_json::json!("flatbed");
        let intake: QuoteIntake = serde_json::from_value(body).unwrap();
        assert!(intake.into_new_quote().unwrap_err().contains("transportType"));
    }

    #[test]
    fn test_intake_parses_optional_fields() {
        let mut body = jane();
        body["transportType"] = serde_json::json!("Enclosed");
        body["preferredDate"] = serde_json::json!("2026-11-02");
        body["operable"] = serde_json::json!(true);
        let intake: QuoteIntake = serde_json::from_value(body).unwrap();
        let quote = intake.into_new_quote().unwrap();
        assert_eq!(quote.transport_type, Some(TransportType::Enclosed));
        assert_eq!(
            quote.preferred_date,
            Some(NaiveDate::from_ymd_opt(2026, 11, 2).unwrap())
        );
        assert_eq!(quote.operable, Some(true));
    }
}
