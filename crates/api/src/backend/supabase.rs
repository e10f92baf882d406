//! Managed backend client over its auth and PostgREST endpoints.
//!
//! # API Reference
//!
//! - Auth: `GET {url}/auth/v1/user` with the caller's bearer token
//! - Tables: `{url}/rest/v1/{quotes,shipments,profiles}`
//! - Procedure: `POST {url}/rest/v1/rpc/convert_quote_to_shipment`
//!
//! Every request carries the service-role key as `apikey`. Table requests
//! also send it as the bearer token, which bypasses row-level security; the
//! route gates are the only access control in front of them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use autohaul_core::{Email, QuoteId, QuoteStatus, ReferenceId, ShipmentId, ShipmentStatus, UserId};

use super::{BackendError, Database, IdentityProvider};
use crate::config::SupabaseConfig;
use crate::models::{NewQuote, Quote, Shipment, User};

const CONVERT_PROCEDURE: &str = "convert_quote_to_shipment";

/// `PostgreSQL` `raise_exception`, used by procedures to refuse an operation.
const PG_RAISE_EXCEPTION: &str = "P0001";

/// `PostgreSQL` `no_data_found`.
const PG_NO_DATA_FOUND: &str = "P0002";

/// Managed backend client.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    base_url: Url,
}

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    role: Option<String>,
}

impl SupabaseClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, BackendError> {
        let key = config.service_role_key.expose_secret();
        let mut headers = HeaderMap::new();

        let mut apikey = HeaderValue::from_str(key)
            .map_err(|e| BackendError::Decode(format!("Invalid service key format: {e}")))?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| BackendError::Decode(format!("Invalid service key format: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                base_url: config.url.clone(),
            }),
        })
    }

    /// Build an endpoint URL under the project URL.
    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}"))
            .map_err(|e| BackendError::Decode(format!("Invalid endpoint URL: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// `GET` a table and decode the rows.
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"), query)?;
        let response = self.inner.client.get(url).send().await?;
        handle_response(response).await
    }

    /// `PATCH` matching rows and return the updated representation.
    async fn update<T: DeserializeOwned, B: serde::Serialize + Sync>(
        &self,
        table: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"), query)?;
        let response = self
            .inner
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        handle_response(response).await
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn user_for_token(&self, token: &str) -> Result<User, BackendError> {
        let url = self.endpoint("auth/v1/user", &[])?;
        let response = self
            .inner
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        handle_response(response).await
    }

    async fn profile_role(&self, user_id: UserId) -> Result<Option<String>, BackendError> {
        let id = format!("eq.{user_id}");
        let rows: Vec<ProfileRow> = self
            .select("profiles", &[("select", "role"), ("id", &id), ("limit", "1")])
            .await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }
}

#[async_trait]
impl Database for SupabaseClient {
    async fn insert_quote(&self, quote: &NewQuote) -> Result<Quote, BackendError> {
        let url = self.endpoint("rest/v1/quotes", &[])?;
        let response = self
            .inner
            .client
            .post(url)
            .header("Prefer", "return=representation")
            .json(&[quote])
            .send()
            .await?;
        let rows: Vec<Quote> = handle_response(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".to_string()))
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, BackendError> {
        self.select("quotes", &[("select", "*"), ("order", "created_at.desc")])
            .await
    }

    async fn get_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError> {
        let id = format!("eq.{id}");
        let rows: Vec<Quote> = self
            .select("quotes", &[("select", "*"), ("id", &id), ("limit", "1")])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn close_quote(&self, id: QuoteId) -> Result<Option<Quote>, BackendError> {
        let id = format!("eq.{id}");
        let not_converted = format!("neq.{}", QuoteStatus::Converted);
        let rows: Vec<Quote> = self
            .update(
                "quotes",
                &[("id", &id), ("quote_status", &not_converted)],
                &serde_json::json!({ "quote_status": QuoteStatus::Closed }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_shipment_for_tracking(
        &self,
        reference_id: &ReferenceId,
        email: &Email,
    ) -> Result<Option<Shipment>, BackendError> {
        let reference = format!("eq.{reference_id}");
        let pattern = format!("ilike.{}", email_pattern(email));
        let rows: Vec<Shipment> = self
            .select(
                "shipments",
                &[
                    ("select", "*"),
                    ("reference_id", &reference),
                    ("customer_email", &pattern),
                    ("order", "created_at.desc"),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .find(|row| email.eq_ignore_case(&row.customer_email)))
    }

    async fn list_shipments(&self) -> Result<Vec<Shipment>, BackendError> {
        self.select("shipments", &[("select", "*"), ("order", "created_at.desc")])
            .await
    }

    async fn list_shipments_for_email(
        &self,
        email: &Email,
    ) -> Result<Vec<Shipment>, BackendError> {
        let pattern = format!("ilike.{}", email_pattern(email));
        let rows: Vec<Shipment> = self
            .select(
                "shipments",
                &[
                    ("select", "*"),
                    ("customer_email", &pattern),
                    ("order", "created_at.desc"),
                ],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| email.eq_ignore_case(&row.customer_email))
            .collect())
    }

    async fn convert_quote_to_shipment(
        &self,
        quote_id: QuoteId,
    ) -> Result<Option<ShipmentId>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/rpc/{CONVERT_PROCEDURE}"), &[])?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&serde_json::json!({ "p_quote_id": quote_id }))
            .send()
            .await?;
        let value: serde_json::Value = handle_response(response).await?;
        parse_procedure_id(value)
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, BackendError> {
        let id = format!("eq.{id}");
        let rows: Vec<Shipment> = self
            .select("shipments", &[("select", "*"), ("id", &id), ("limit", "1")])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_shipment_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Shipment>, BackendError> {
        let id = format!("eq.{id}");
        let rows: Vec<Shipment> = self
            .update(
                "shipments",
                &[("id", &id)],
                &serde_json::json!({ "status": status, "updated_at": updated_at }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Decode a successful response, or map the error body.
async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Failed to parse response: {e}")));
    }

    Err(parse_error(response).await)
}

/// Map an error response onto [`BackendError`].
async fn parse_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();

    if status == 401 || status == 403 {
        return BackendError::Unauthorized;
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    classify_error(status, &body)
}

fn classify_error(status: u16, body: &str) -> BackendError {
    let parsed = serde_json::from_str::<PostgrestError>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.to_string());

    match parsed.as_ref().and_then(|e| e.code.as_deref()) {
        Some(PG_RAISE_EXCEPTION) => BackendError::Rejected(message),
        Some(PG_NO_DATA_FOUND) => BackendError::NotFound(message),
        _ if status == 404 => BackendError::NotFound(message),
        _ => BackendError::Api { status, message },
    }
}

/// Interpret the procedure's return value as a shipment id.
///
/// The procedure returns a bare UUID, or `null` when it created nothing.
fn parse_procedure_id(value: serde_json::Value) -> Result<Option<ShipmentId>, BackendError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|e| BackendError::Decode(format!("Invalid shipment id {s:?}: {e}"))),
        other => Err(BackendError::Decode(format!(
            "Unexpected procedure result: {other}"
        ))),
    }
}

/// `ilike` pattern for an email, as narrow as PostgREST allows.
///
/// `%`, `_` and `\` are escaped. PostgREST rewrites every `*` to `%` before
/// the escape is seen, so a `*` becomes the single-character wildcard `_`.
/// The pattern can therefore over-match; callers must re-check each row
/// with [`Email::eq_ignore_case`].
fn email_pattern(email: &Email) -> String {
    let value = email.as_str();
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '*' => escaped.push('_'),
            _ => escaped.push(c),
        }
    }
    escaped
}
