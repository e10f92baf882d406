//! Typed client for the Autohaul API.
//!
//! Protected calls attach the current access token from the identity SDK.
//! Any non-2xx response becomes [`ApiClientError::Status`] carrying the body
//! text, which views show inline.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use url::Url;

use autohaul_core::{Email, QuoteId, ReferenceId, ShipmentId, ShipmentStatus};

use crate::models::{CreatedQuote, HealthStatus, Quote, QuoteSubmission, Shipment, StatusNotice};
use crate::sdk::IdentitySdk;

/// Errors from API calls.
#[derive(Debug, Error)]
pub enum ApiClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A protected call was made while signed out.
    #[error("Not signed in")]
    NotSignedIn,

    /// Response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiClientError {
    /// HTTP status of a [`Self::Status`] error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Autohaul API client.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    sdk: Arc<dyn IdentitySdk>,
}

impl ApiClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url, sdk: Arc<dyn IdentitySdk>) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            sdk,
        })
    }

    /// `GET /api/health`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API is unhealthy.
    pub async fn health(&self) -> Result<HealthStatus, ApiClientError> {
        self.send(self.request(Method::GET, "api/health")).await
    }

    /// `POST /api/quotes`
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::Status`] with the validation message on 400.
    pub async fn submit_quote(
        &self,
        submission: &QuoteSubmission,
    ) -> Result<CreatedQuote, ApiClientError> {
        self.send(self.request(Method::POST, "api/quotes").json(submission))
            .await
    }

    /// `GET /api/track`. Returns `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns error on any failure other than "not found".
    pub async fn track(
        &self,
        reference_id: &ReferenceId,
        email: &Email,
    ) -> Result<Option<Shipment>, ApiClientError> {
        let mut url = self.url("api/track");
        url.query_pairs_mut()
            .append_pair("referenceId", reference_id.as_str())
            .append_pair("email", email.as_str());
        let request = self.client.get(url);

        match self.send(request).await {
            Ok(shipment) => Ok(Some(shipment)),
            Err(ApiClientError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `GET /api/my-shipments`
    ///
    /// # Errors
    ///
    /// Returns error if signed out, forbidden, or the request fails.
    pub async fn my_shipments(&self) -> Result<Vec<Shipment>, ApiClientError> {
        let request = self.authed(Method::GET, "api/my-shipments").await?;
        self.send(request).await
    }

    /// `GET /api/shipments`
    ///
    /// # Errors
    ///
    /// Returns error if signed out, forbidden, or the request fails.
    pub async fn list_shipments(&self) -> Result<Vec<Shipment>, ApiClientError> {
        let request = self.authed(Method::GET, "api/shipments").await?;
        self.send(request).await
    }

    /// `GET /api/quotes`
    ///
    /// # Errors
    ///
    /// Returns error if signed out, forbidden, or the request fails.
    pub async fn list_quotes(&self) -> Result<Vec<Quote>, ApiClientError> {
        let request = self.authed(Method::GET, "api/quotes").await?;
        self.send(request).await
    }

    /// `POST /api/shipments/from-quote`
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::Status`] 409 if the quote cannot be converted.
    pub async fn convert_quote(&self, quote_id: QuoteId) -> Result<Shipment, ApiClientError> {
        let request = self
            .authed(Method::POST, "api/shipments/from-quote")
            .await?
            .json(&json!({ "quoteId": quote_id }));
        self.send(request).await
    }

    /// `PATCH /api/quotes/{id}/close`
    ///
    /// # Errors
    ///
    /// Returns [`ApiClientError::Status`] 409 if the quote was converted.
    pub async fn close_quote(&self, quote_id: QuoteId) -> Result<Quote, ApiClientError> {
        let request = self
            .authed(Method::PATCH, &format!("api/quotes/{quote_id}/close"))
            .await?;
        self.send(request).await
    }

    /// `PATCH /api/shipments/{id}/status`
    ///
    /// # Errors
    ///
    /// Returns error if signed out, forbidden, or the request fails.
    pub async fn update_shipment_status(
        &self,
        shipment_id: ShipmentId,
        status: ShipmentStatus,
    ) -> Result<Shipment, ApiClientError> {
        let request = self
            .authed(Method::PATCH, &format!("api/shipments/{shipment_id}/status"))
            .await?
            .json(&json!({ "status": status }));
        self.send(request).await
    }

    /// `POST /api/notifications/status`
    ///
    /// # Errors
    ///
    /// Returns error if the notice is rejected or cannot be queued.
    pub async fn notify_status(&self, notice: &StatusNotice) -> Result<(), ApiClientError> {
        let _: serde_json::Value = self
            .send(self.request(Method::POST, "api/notifications/status").json(notice))
            .await?;
        Ok(())
    }

    /// `POST /api/notifications/new-quote`
    ///
    /// # Errors
    ///
    /// Returns error if the submission is rejected.
    pub async fn notify_new_quote(
        &self,
        submission: &QuoteSubmission,
        reference_id: Option<&ReferenceId>,
    ) -> Result<(), ApiClientError> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            submission: &'a QuoteSubmission,
            #[serde(rename = "referenceId", skip_serializing_if = "Option::is_none")]
            reference_id: Option<&'a ReferenceId>,
        }

        let body = Body {
            submission,
            reference_id,
        };
        let _: serde_json::Value = self
            .send(
                self.request(Method::POST, "api/notifications/new-quote")
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/{path}"));
        url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    async fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiClientError> {
        let token = self
            .sdk
            .access_token()
            .await
            .ok_or(ApiClientError::NotSignedIn)?;
        Ok(self.request(method, path).bearer_auth(token.expose_secret()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiClientError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                tracing::debug!("API rejected the session token");
            }
            return Err(ApiClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiClientError::Decode(format!("Failed to parse response: {e}")))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sdk::MemorySdk;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(Url::parse(base).unwrap(), Arc::new(MemorySdk::new())).unwrap()
    }

    #[test]
    fn test_url_joins_base_path() {
        assert_eq!(
            client("http://localhost:3001").url("api/health").as_str(),
            "http://localhost:3001/api/health"
        );
        assert_eq!(
            client("https://example.com/backend/").url("api/quotes").as_str(),
            "https://example.com/backend/api/quotes"
        );
    }

    #[tokio::test]
    async fn test_protected_call_needs_session() {
        let result = client("http://localhost:3001").my_shipments().await;
        assert!(matches!(result, Err(ApiClientError::NotSignedIn)));
    }

    #[test]
    fn test_status_accessor() {
        let err = ApiClientError::Status {
            status: 409,
            body: "{\"error\":\"Quote already converted\"}".to_string(),
        };
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("Quote already converted"));
        assert_eq!(ApiClientError::NotSignedIn.status(), None);
    }
}
