//! HTTP client for the Duffel flights API.
//!
//! Every call is a single attempt: a network failure or non-2xx status is
//! reported as `ProviderError::Unavailable`, a 2xx body that does not parse
//! as `ProviderError::Rejected`. Holds in particular must never be retried
//! here, a second attempt can double-book.

use std::time::Duration;

use async_trait::async_trait;
use junket_core::provider::{
    is_provider_id, CancellationQuote, FlightProvider, Offer, OfferPage, OfferPageRequest, OfferSearch,
    PassengerDetails, PaymentConfirmation, ProviderError, ProviderOrder,
};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.duffel.com";
pub const DEFAULT_API_VERSION: &str = "v2";

/// Duffel client configuration.
#[derive(Debug, Clone)]
pub struct DuffelConfig {
    pub base_url: String,
    pub access_token: String,
    /// Sent as the `Duffel-Version` header.
    pub api_version: String,
    pub timeout: Duration,
}

impl Default for DuffelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl DuffelConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Duffel access token not configured")]
    MissingToken,
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Deserialize)]
struct ListMeta {
    after: Option<String>,
    before: Option<String>,
}

#[derive(Deserialize)]
struct OfferRequestCreated {
    id: String,
}

pub struct DuffelClient {
    client: Client,
    config: DuffelConfig,
}

impl DuffelClient {
    pub fn new(config: DuffelConfig) -> Result<Self, ClientError> {
        if config.access_token.is_empty() {
            return Err(ClientError::MissingToken);
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        self.client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
            .header("Duffel-Version", &self.config.api_version)
            .header(ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "Duffel request failed");
            ProviderError::Unavailable(format!("{}: {}", operation, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                operation,
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Duffel returned non-success status"
            );
            return Err(ProviderError::Unavailable(format!("{}: HTTP {}", operation, status)));
        }

        debug!(operation, status = %status, "Duffel call succeeded");
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Rejected(format!("{}: malformed response: {}", operation, e)))
    }
}

pub(crate) fn offer_request_body(search: &OfferSearch) -> Value {
    json!({
        "data": {
            "slices": [
                {
                    "origin": search.origin,
                    "destination": search.destination,
                    "departure_date": search.departure_date,
                },
                {
                    "origin": search.destination,
                    "destination": search.origin,
                    "departure_date": search.return_date,
                }
            ],
            "passengers": [{ "type": "adult" }],
            "cabin_class": search.cabin_class.unwrap_or_default(),
        }
    })
}

pub(crate) fn hold_order_body(offer_id: &str, passengers: &[PassengerDetails]) -> Value {
    json!({
        "data": {
            "type": "hold",
            "selected_offers": [offer_id],
            "passengers": passengers,
        }
    })
}

pub(crate) fn payment_body(order_id: &str, amount: Decimal, currency: &str) -> Value {
    json!({
        "data": {
            "order_id": order_id,
            "payment": {
                "type": "balance",
                "amount": amount.to_string(),
                "currency": currency,
            }
        }
    })
}

/// Refuses an identifier before it is interpolated into a path or body.
pub(crate) fn checked_id<'a>(operation: &'static str, id: &'a str) -> Result<&'a str, ProviderError> {
    if is_provider_id(id) {
        Ok(id)
    } else {
        Err(ProviderError::Rejected(format!("{}: malformed identifier {:?}", operation, id)))
    }
}

pub(crate) fn offer_page_query(page: &OfferPageRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("offer_request_id", page.offer_request_id.clone()),
        ("limit", page.limit.to_string()),
    ];
    if let Some(after) = &page.after {
        query.push(("after", after.clone()));
    }
    if let Some(before) = &page.before {
        query.push(("before", before.clone()));
    }
    query
}

#[async_trait]
impl FlightProvider for DuffelClient {
    async fn create_offer_request(&self, search: &OfferSearch) -> Result<String, ProviderError> {
        let request = self
            .request(Method::POST, "/air/offer_requests")
            .query(&[("return_offers", "false")])
            .json(&offer_request_body(search));

        let created: DataEnvelope<OfferRequestCreated> = self.send("create_offer_request", request).await?;
        Ok(created.data.id)
    }

    async fn fetch_offers(&self, page: &OfferPageRequest) -> Result<OfferPage, ProviderError> {
        let request = self
            .request(Method::GET, "/air/offers")
            .query(&offer_page_query(page));

        let list: ListEnvelope<Offer> = self.send("fetch_offers", request).await?;
        let (after, before) = list.meta.map(|m| (m.after, m.before)).unwrap_or((None, None));
        Ok(OfferPage {
            offers: list.data,
            after,
            before,
        })
    }

    async fn fetch_offer(&self, offer_id: &str) -> Result<Offer, ProviderError> {
        let offer_id = checked_id("fetch_offer", offer_id)?;
        let request = self
            .request(Method::GET, &format!("/air/offers/{}", offer_id))
            .query(&[("return_available_services", "true")]);

        let offer: DataEnvelope<Offer> = self.send("fetch_offer", request).await?;
        Ok(offer.data)
    }

    async fn hold_order(
        &self,
        offer_id: &str,
        passengers: &[PassengerDetails],
    ) -> Result<ProviderOrder, ProviderError> {
        let offer_id = checked_id("hold_order", offer_id)?;
        let request = self
            .request(Method::POST, "/air/orders")
            .json(&hold_order_body(offer_id, passengers));

        let order: DataEnvelope<ProviderOrder> = self.send("hold_order", request).await?;
        Ok(order.data)
    }

    async fn pay(
        &self,
        order_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentConfirmation, ProviderError> {
        let request = self
            .request(Method::POST, "/air/payments")
            .json(&payment_body(order_id, amount, currency));

        let payment: DataEnvelope<PaymentConfirmation> = self.send("pay", request).await?;
        Ok(payment.data)
    }

    async fn request_cancellation_quote(&self, order_id: &str) -> Result<CancellationQuote, ProviderError> {
        let request = self
            .request(Method::POST, "/air/order_cancellations")
            .json(&json!({ "data": { "order_id": order_id } }));

        let quote: DataEnvelope<CancellationQuote> = self.send("request_cancellation_quote", request).await?;
        Ok(quote.data)
    }

    async fn confirm_cancellation(&self, quote_id: &str) -> Result<CancellationQuote, ProviderError> {
        let quote_id = checked_id("confirm_cancellation", quote_id)?;
        let request = self.request(
            Method::POST,
            &format!("/air/order_cancellations/{}/actions/confirm", quote_id),
        );

        let confirmed: DataEnvelope<CancellationQuote> = self.send("confirm_cancellation", request).await?;
        Ok(confirmed.data)
    }
}
