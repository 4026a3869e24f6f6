use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use junket_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::itinerary::Airport;

/// Failure of one provider call. Neither variant is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Network failure or a non-2xx response.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// 2xx response whose payload cannot be used.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Provider identifiers (`off_...`, `ord_...`, `ore_...`) are ASCII
/// alphanumerics and underscores. Anything else must not reach a request
/// path or body.
pub fn is_provider_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

/// Round-trip search: outbound on `departure_date`, return on `return_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferSearch {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: NaiveDate,
    #[serde(default)]
    pub cabin_class: Option<CabinClass>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPageRequest {
    pub offer_request_id: String,
    pub limit: u32,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPage {
    pub offers: Vec<Offer>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPlace {
    pub name: String,
    pub city_name: Option<String>,
    pub iata_code: String,
}

impl From<&ProviderPlace> for Airport {
    fn from(place: &ProviderPlace) -> Self {
        Airport {
            name: place.name.clone(),
            city: place.city_name.clone(),
            iata_code: place.iata_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSegment {
    pub origin: ProviderPlace,
    pub destination: ProviderPlace,
    pub departing_at: String,
    pub arriving_at: String,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSlice {
    pub origin: ProviderPlace,
    pub destination: ProviderPlace,
    pub duration: Option<String>,
    #[serde(default)]
    pub segments: Vec<ProviderSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPassenger {
    pub id: String,
    #[serde(rename = "type", default)]
    pub passenger_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub name: String,
    pub iata_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    #[serde(default)]
    pub live_mode: bool,
    pub expires_at: DateTime<Utc>,
    pub total_amount: Decimal,
    pub total_currency: String,
    pub base_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub owner: Option<Carrier>,
    #[serde(default)]
    pub available_services: Vec<serde_json::Value>,
    #[serde(default)]
    pub passengers: Vec<ProviderPassenger>,
    #[serde(default)]
    pub slices: Vec<ProviderSlice>,
}

/// Passenger as sent with a hold. `id` must be one of the offer's
/// passenger IDs; the orchestrator fills it in when the caller leaves it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub given_name: String,
    pub family_name: String,
    pub gender: String,
    pub born_on: NaiveDate,
    pub email: Masked<String>,
    pub phone_number: Masked<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPaymentStatus {
    #[serde(default)]
    pub awaiting_payment: bool,
    pub payment_required_by: Option<DateTime<Utc>>,
    pub price_guarantee_expires_at: Option<DateTime<Utc>>,
}

/// A held (unpaid) order as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    #[serde(default)]
    pub live_mode: bool,
    pub booking_reference: Option<String>,
    pub total_amount: Decimal,
    pub total_currency: String,
    pub base_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_status: OrderPaymentStatus,
    #[serde(default)]
    pub passengers: Vec<ProviderPassenger>,
    #[serde(default)]
    pub slices: Vec<ProviderSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Cancellation quote; the same shape comes back from the confirm call
/// with `confirmed_at` filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationQuote {
    pub id: String,
    pub order_id: String,
    pub expires_at: DateTime<Utc>,
    pub refund_amount: Option<Decimal>,
    pub refund_currency: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Flight-offer provider. Implementations shape requests and interpret
/// response status; they never retry and never persist.
#[async_trait]
pub trait FlightProvider: Send + Sync {
    async fn create_offer_request(&self, search: &OfferSearch) -> Result<String, ProviderError>;

    async fn fetch_offers(&self, page: &OfferPageRequest) -> Result<OfferPage, ProviderError>;

    async fn fetch_offer(&self, offer_id: &str) -> Result<Offer, ProviderError>;

    async fn hold_order(
        &self,
        offer_id: &str,
        passengers: &[PassengerDetails],
    ) -> Result<ProviderOrder, ProviderError>;

    async fn pay(
        &self,
        order_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentConfirmation, ProviderError>;

    async fn request_cancellation_quote(&self, order_id: &str) -> Result<CancellationQuote, ProviderError>;

    async fn confirm_cancellation(&self, quote_id: &str) -> Result<CancellationQuote, ProviderError>;
}
