//! Scripted in-process provider for local development and tests.
//!
//! Behaves like a small Duffel sandbox: searches generate round-trip offers,
//! holds turn offers into orders, payments must match the order total, and
//! cancellation quotes expire after a configurable window. Any operation can
//! be told to fail once.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use junket_core::provider::{
    CancellationQuote, Carrier, FlightProvider, Offer, OfferPage, OfferPageRequest, OfferSearch,
    OrderPaymentStatus, PassengerDetails, PaymentConfirmation, ProviderError, ProviderOrder,
    ProviderPassenger, ProviderPlace, ProviderSegment, ProviderSlice,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    CreateOfferRequest,
    FetchOffers,
    FetchOffer,
    HoldOrder,
    Pay,
    RequestCancellationQuote,
    ConfirmCancellation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: ProviderOperation,
    pub target: String,
}

struct MockState {
    live_mode: bool,
    offers: Vec<Offer>,
    offer_requests: HashMap<String, Vec<String>>,
    orders: HashMap<String, ProviderOrder>,
    quotes: HashMap<String, CancellationQuote>,
    failures: HashMap<ProviderOperation, ProviderError>,
    calls: Vec<ProviderCall>,
    hold_window: Duration,
    quote_ttl: Duration,
    confirm_cancellations: bool,
    pay_latency: Option<std::time::Duration>,
    counter: u64,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{}_{}", prefix, self.counter)
    }

    /// Records the call and pops a scripted failure for it, if any.
    fn enter(&mut self, operation: ProviderOperation, target: &str) -> Result<(), ProviderError> {
        self.calls.push(ProviderCall {
            operation,
            target: target.to_string(),
        });
        match self.failures.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn offer(&self, offer_id: &str) -> Result<&Offer, ProviderError> {
        self.offers
            .iter()
            .find(|o| o.id == offer_id)
            .ok_or_else(|| ProviderError::Unavailable(format!("offer {}: HTTP 404 Not Found", offer_id)))
    }
}

pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                live_mode: false,
                offers: Vec::new(),
                offer_requests: HashMap::new(),
                orders: HashMap::new(),
                quotes: HashMap::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                hold_window: Duration::hours(24),
                quote_ttl: Duration::minutes(15),
                confirm_cancellations: true,
                pay_latency: None,
                counter: 0,
            }),
        }
    }

    pub async fn add_offer(&self, offer: Offer) {
        self.state.lock().await.offers.push(offer);
    }

    /// The next call to `operation` fails with `error`.
    pub async fn fail_next(&self, operation: ProviderOperation, error: ProviderError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    /// Negative values produce quotes that are already expired.
    pub async fn set_quote_ttl(&self, ttl: Duration) {
        self.state.lock().await.quote_ttl = ttl;
    }

    pub async fn set_hold_window(&self, window: Duration) {
        self.state.lock().await.hold_window = window;
    }

    pub async fn set_confirms_cancellations(&self, confirm: bool) {
        self.state.lock().await.confirm_cancellations = confirm;
    }

    /// Payments sleep this long before they are recorded, so callers can
    /// overlap.
    pub async fn set_pay_latency(&self, latency: std::time::Duration) {
        self.state.lock().await.pay_latency = Some(latency);
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn calls_to(&self, operation: ProviderOperation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub async fn order(&self, order_id: &str) -> Option<ProviderOrder> {
        self.state.lock().await.orders.get(order_id).cloned()
    }

    /// A bookable round trip with one non-stop segment each way and one
    /// adult passenger (`pas_<offer id>`). Expires in 30 minutes.
    pub fn round_trip_offer(id: &str, origin: &str, destination: &str, total: Decimal) -> Offer {
        let tax = (total * Decimal::new(2, 1)).round_dp(2);
        let outbound = one_stop_free_slice(origin, destination, "2026-11-02T08:00:00", "2026-11-02T10:30:00");
        let inbound = one_stop_free_slice(destination, origin, "2026-11-06T17:15:00", "2026-11-06T19:45:00");

        Offer {
            id: id.to_string(),
            live_mode: false,
            expires_at: Utc::now() + Duration::minutes(30),
            total_amount: total,
            total_currency: "USD".to_string(),
            base_amount: Some(total - tax),
            tax_amount: Some(tax),
            owner: Some(Carrier {
                name: "Duffel Airways".to_string(),
                iata_code: Some("ZZ".to_string()),
            }),
            available_services: vec![serde_json::json!({
                "id": format!("ase_{}", id),
                "type": "baggage",
                "total_amount": "30.00",
                "total_currency": "USD",
            })],
            passengers: vec![ProviderPassenger {
                id: format!("pas_{}", id),
                passenger_type: Some("adult".to_string()),
            }],
            slices: vec![outbound, inbound],
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn place(iata_code: &str) -> ProviderPlace {
    ProviderPlace {
        name: format!("{} International Airport", iata_code),
        city_name: Some(iata_code.to_string()),
        iata_code: iata_code.to_string(),
    }
}

fn one_stop_free_slice(origin: &str, destination: &str, departing_at: &str, arriving_at: &str) -> ProviderSlice {
    ProviderSlice {
        origin: place(origin),
        destination: place(destination),
        duration: Some("PT2H30M".to_string()),
        segments: vec![ProviderSegment {
            origin: place(origin),
            destination: place(destination),
            departing_at: departing_at.to_string(),
            arriving_at: arriving_at.to_string(),
            duration: Some("PT2H30M".to_string()),
        }],
    }
}

#[async_trait]
impl FlightProvider for MockProvider {
    async fn create_offer_request(&self, search: &OfferSearch) -> Result<String, ProviderError> {
        let mut state = self.state.lock().await;
        let route = format!("{}-{}", search.origin, search.destination);
        state.enter(ProviderOperation::CreateOfferRequest, &route)?;

        let request_id = state.next_id("orq");
        let mut offer_ids = Vec::new();
        for fare in [189, 245, 312] {
            let offer_id = state.next_id("off");
            let mut offer = Self::round_trip_offer(&offer_id, &search.origin, &search.destination, Decimal::new(fare, 0));
            offer.live_mode = state.live_mode;
            offer_ids.push(offer_id);
            state.offers.push(offer);
        }
        state.offer_requests.insert(request_id.clone(), offer_ids);

        info!(offer_request_id = %request_id, route = %route, "Mock offer request created");
        Ok(request_id)
    }

    async fn fetch_offers(&self, page: &OfferPageRequest) -> Result<OfferPage, ProviderError> {
        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::FetchOffers, &page.offer_request_id)?;

        let ids = state
            .offer_requests
            .get(&page.offer_request_id)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable("offer request: HTTP 404 Not Found".to_string()))?;

        let limit = page.limit.max(1) as usize;
        let (start, end) = match (&page.after, &page.before) {
            (Some(after), _) => {
                let start = ids.iter().position(|id| id == after).map(|p| p + 1).unwrap_or(ids.len());
                (start, (start + limit).min(ids.len()))
            }
            (None, Some(before)) => {
                let end = ids.iter().position(|id| id == before).unwrap_or(0);
                (end.saturating_sub(limit), end)
            }
            (None, None) => (0, limit.min(ids.len())),
        };

        let window = &ids[start..end];
        let mut offers = Vec::with_capacity(window.len());
        for id in window {
            offers.push(state.offer(id)?.clone());
        }

        Ok(OfferPage {
            offers,
            after: if end < ids.len() { window.last().cloned() } else { None },
            before: if start > 0 { window.first().cloned() } else { None },
        })
    }

    async fn fetch_offer(&self, offer_id: &str) -> Result<Offer, ProviderError> {
        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::FetchOffer, offer_id)?;
        state.offer(offer_id).cloned()
    }

    async fn hold_order(
        &self,
        offer_id: &str,
        passengers: &[PassengerDetails],
    ) -> Result<ProviderOrder, ProviderError> {
        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::HoldOrder, offer_id)?;

        let offer = state.offer(offer_id)?.clone();
        if passengers.len() != offer.passengers.len() {
            return Err(ProviderError::Unavailable("hold_order: HTTP 422 Unprocessable Entity".to_string()));
        }

        state.counter += 1;
        let order_id = format!("ord_{}", state.orders.len() + 1);
        let order = ProviderOrder {
            id: order_id.clone(),
            live_mode: offer.live_mode,
            booking_reference: Some(format!("JKT{:03}", state.counter)),
            total_amount: offer.total_amount,
            total_currency: offer.total_currency.clone(),
            base_amount: offer.base_amount,
            tax_amount: offer.tax_amount,
            payment_status: OrderPaymentStatus {
                awaiting_payment: true,
                payment_required_by: Some(Utc::now() + state.hold_window),
                price_guarantee_expires_at: None,
            },
            passengers: offer.passengers.clone(),
            slices: offer.slices.clone(),
        };
        state.orders.insert(order_id.clone(), order.clone());

        info!(order_id = %order_id, offer_id, "Mock hold order created");
        Ok(order)
    }

    async fn pay(
        &self,
        order_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentConfirmation, ProviderError> {
        let latency = self.state.lock().await.pay_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::Pay, order_id)?;

        let payment_id = state.next_id("pay");
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ProviderError::Unavailable("pay: HTTP 404 Not Found".to_string()))?;

        if order.total_amount != amount || order.total_currency != currency {
            return Err(ProviderError::Unavailable("pay: HTTP 422 Unprocessable Entity".to_string()));
        }
        order.payment_status.awaiting_payment = false;

        Ok(PaymentConfirmation {
            id: payment_id,
            amount,
            currency: currency.to_string(),
            created_at: Some(Utc::now()),
        })
    }

    async fn request_cancellation_quote(&self, order_id: &str) -> Result<CancellationQuote, ProviderError> {
        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::RequestCancellationQuote, order_id)?;

        let order = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ProviderError::Unavailable("order_cancellations: HTTP 404 Not Found".to_string()))?;

        let quote = CancellationQuote {
            id: state.next_id("ore"),
            order_id: order.id,
            expires_at: Utc::now() + state.quote_ttl,
            refund_amount: Some(order.total_amount),
            refund_currency: Some(order.total_currency),
            confirmed_at: None,
        };
        state.quotes.insert(quote.id.clone(), quote.clone());
        Ok(quote)
    }

    async fn confirm_cancellation(&self, quote_id: &str) -> Result<CancellationQuote, ProviderError> {
        let mut state = self.state.lock().await;
        state.enter(ProviderOperation::ConfirmCancellation, quote_id)?;

        let confirm = state.confirm_cancellations;
        let quote = state
            .quotes
            .get_mut(quote_id)
            .ok_or_else(|| ProviderError::Unavailable("confirm: HTTP 404 Not Found".to_string()))?;

        if confirm {
            quote.confirmed_at = Some(Utc::now());
        }
        Ok(quote.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use junket_shared::Masked;

    fn passenger() -> PassengerDetails {
        PassengerDetails {
            id: Some("pas_off_a".to_string()),
            title: "mr".to_string(),
            given_name: "Tony".to_string(),
            family_name: "Stark".to_string(),
            gender: "m".to_string(),
            born_on: NaiveDate::from_ymd_opt(1980, 7, 24).unwrap(),
            email: Masked::from("tony@example.com"),
            phone_number: Masked::from("+14155550100"),
        }
    }

    #[tokio::test]
    async fn test_hold_mirrors_offer() {
        let provider = MockProvider::new();
        provider
            .add_offer(MockProvider::round_trip_offer("off_a", "JFK", "LAX", Decimal::new(25000, 2)))
            .await;

        let order = provider.hold_order("off_a", &[passenger()]).await.unwrap();
        assert_eq!(order.id, "ord_1");
        assert_eq!(order.total_amount, Decimal::new(25000, 2));
        assert_eq!(order.slices.len(), 2);
        assert!(order.payment_status.awaiting_payment);
        assert!(order.payment_status.payment_required_by.is_some());
    }

    #[tokio::test]
    async fn test_payment_must_match_total() {
        let provider = MockProvider::new();
        provider
            .add_offer(MockProvider::round_trip_offer("off_a", "JFK", "LAX", Decimal::new(25000, 2)))
            .await;
        provider.hold_order("off_a", &[passenger()]).await.unwrap();

        assert!(provider.pay("ord_1", Decimal::new(100, 0), "USD").await.is_err());
        assert!(provider.pay("ord_1", Decimal::new(250, 0), "USD").await.is_ok());
        assert_eq!(provider.calls_to(ProviderOperation::Pay).await, 2);
    }

    #[tokio::test]
    async fn test_scripted_failure_fires_once() {
        let provider = MockProvider::new();
        provider
            .fail_next(ProviderOperation::FetchOffer, ProviderError::Unavailable("HTTP 503".to_string()))
            .await;
        provider
            .add_offer(MockProvider::round_trip_offer("off_a", "JFK", "LAX", Decimal::new(100, 0)))
            .await;

        assert!(provider.fetch_offer("off_a").await.is_err());
        assert!(provider.fetch_offer("off_a").await.is_ok());
    }

    #[tokio::test]
    async fn test_search_pages_with_cursors() {
        let provider = MockProvider::new();
        let request_id = provider
            .create_offer_request(&OfferSearch {
                origin: "SFO".to_string(),
                destination: "ORD".to_string(),
                departure_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
                return_date: NaiveDate::from_ymd_opt(2026, 11, 6).unwrap(),
                cabin_class: None,
            })
            .await
            .unwrap();

        let first = provider
            .fetch_offers(&OfferPageRequest {
                offer_request_id: request_id.clone(),
                limit: 2,
                after: None,
                before: None,
            })
            .await
            .unwrap();
        assert_eq!(first.offers.len(), 2);
        assert!(first.after.is_some());
        assert!(first.before.is_none());

        let second = provider
            .fetch_offers(&OfferPageRequest {
                offer_request_id: request_id,
                limit: 2,
                after: first.after,
                before: None,
            })
            .await
            .unwrap();
        assert_eq!(second.offers.len(), 1);
        assert!(second.after.is_none());
        assert!(second.before.is_some());
    }

    #[tokio::test]
    async fn test_cancellation_confirmation_can_be_withheld() {
        let provider = MockProvider::new();
        provider
            .add_offer(MockProvider::round_trip_offer("off_a", "JFK", "LAX", Decimal::new(100, 0)))
            .await;
        provider.hold_order("off_a", &[passenger()]).await.unwrap();
        provider.set_confirms_cancellations(false).await;

        let quote = provider.request_cancellation_quote("ord_1").await.unwrap();
        let confirmed = provider.confirm_cancellation(&quote.id).await.unwrap();
        assert!(confirmed.confirmed_at.is_none());
    }
}
