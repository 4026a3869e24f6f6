//! Flight booking orchestration: hold, pay, decline, cancel.
//!
//! The provider is always called before the local write it justifies. A
//! hold that succeeds with the provider but cannot be recorded locally is
//! compensated with a provider cancellation; if that also fails a
//! reconcile event is published for a human to act on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use junket_core::budget::{BudgetPolicy, BudgetSnapshot};
use junket_core::directory::Attendee;
use junket_core::duration::parse_duration_minutes;
use junket_core::events::EventPublisher;
use junket_core::itinerary::{
    Itinerary, ItineraryDetail, NewItinerary, NewSegment, NewSlice, SliceDetail, Transition,
    TransitionError,
};
use junket_core::provider::{
    is_provider_id, CancellationQuote, FlightProvider, Offer, OfferPage, OfferPageRequest, OfferSearch, PassengerDetails,
    ProviderOrder, ProviderSlice,
};
use junket_core::repository::{DirectoryRepository, ItineraryStore, ItineraryTx, StoreError};
use junket_shared::models::events::{
    ItineraryStatusEvent, ReconcileRequiredEvent, TOPIC_ITINERARY_APPROVED, TOPIC_ITINERARY_DENIED,
    TOPIC_ITINERARY_HELD, TOPIC_ITINERARY_RECONCILE,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BookingError;

#[derive(Debug, Clone)]
pub struct BookingSettings {
    /// Currency of the provider balance. Offers and itineraries priced in
    /// anything else are refused.
    pub payment_currency: String,
    /// Offers must match this mode to be held.
    pub live_mode: bool,
    pub compensate_failed_holds: bool,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            payment_currency: "USD".to_string(),
            live_mode: false,
            compensate_failed_holds: true,
        }
    }
}

/// First page of a fresh search plus the request ID for paging further.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub offer_request_id: String,
    #[serde(flatten)]
    pub page: OfferPage,
}

/// Provider orders with a payment in flight in this process.
#[derive(Default)]
struct PaymentClaims(Mutex<HashSet<String>>);

impl PaymentClaims {
    fn claim(&self, order_id: &str) -> Option<PaymentClaim<'_>> {
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(order_id.to_string()).then(|| PaymentClaim {
            claims: self,
            order_id: order_id.to_string(),
        })
    }
}

/// Released on drop, whichever way `pay` returns.
struct PaymentClaim<'a> {
    claims: &'a PaymentClaims,
    order_id: String,
}

impl Drop for PaymentClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

pub struct BookingOrchestrator {
    provider: Arc<dyn FlightProvider>,
    itineraries: Arc<dyn ItineraryStore>,
    directory: Arc<dyn DirectoryRepository>,
    events: Arc<dyn EventPublisher>,
    settings: BookingSettings,
    payments: PaymentClaims,
}

impl BookingOrchestrator {
    pub fn new(
        provider: Arc<dyn FlightProvider>,
        itineraries: Arc<dyn ItineraryStore>,
        directory: Arc<dyn DirectoryRepository>,
        events: Arc<dyn EventPublisher>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            provider,
            itineraries,
            directory,
            events,
            settings,
            payments: PaymentClaims::default(),
        }
    }

    pub fn itineraries(&self) -> &Arc<dyn ItineraryStore> {
        &self.itineraries
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryRepository> {
        &self.directory
    }

    /// Starts a round-trip search on behalf of an attendee and returns the
    /// first page of offers.
    pub async fn search_flights(
        &self,
        requester: Uuid,
        event_id: Uuid,
        search: &OfferSearch,
        limit: u32,
    ) -> Result<SearchResult, BookingError> {
        self.attendee(requester, event_id).await?;
        validate_search(search)?;

        let offer_request_id = self
            .provider
            .create_offer_request(search)
            .await
            .map_err(BookingError::Provider)?;

        let page = self
            .list_offers(&OfferPageRequest {
                offer_request_id: offer_request_id.clone(),
                limit,
                after: None,
                before: None,
            })
            .await?;

        Ok(SearchResult { offer_request_id, page })
    }

    pub async fn list_offers(&self, page: &OfferPageRequest) -> Result<OfferPage, BookingError> {
        if page.offer_request_id.trim().is_empty() {
            return Err(BookingError::InvalidRequest("offer_request_id is required".to_string()));
        }
        self.provider.fetch_offers(page).await.map_err(BookingError::Provider)
    }

    pub async fn get_offer(&self, offer_id: &str) -> Result<Offer, BookingError> {
        check_offer_id(offer_id)?;
        self.provider.fetch_offer(offer_id).await.map_err(BookingError::Provider)
    }

    /// Holds `offer_id` with the provider for the requesting attendee and
    /// records the itinerary with its slices and segments as `pending`.
    pub async fn hold(
        &self,
        requester: Uuid,
        event_id: Uuid,
        offer_id: &str,
        passengers: Vec<PassengerDetails>,
    ) -> Result<ItineraryDetail, BookingError> {
        check_offer_id(offer_id)?;
        let attendee = self.attendee(requester, event_id).await?;
        let snapshot = self.budget_snapshot(&attendee).await?;

        let now = Utc::now();
        let offer = self.provider.fetch_offer(offer_id).await.map_err(BookingError::BookingFailed)?;
        self.validate_offer(&offer, now)?;
        let passengers = assign_passenger_ids(&offer, passengers)?;

        let order = self.provider.hold_order(&offer.id, &passengers).await.map_err(|e| {
            warn!(offer_id, attendee_id = %attendee.id, error = %e, "Provider hold failed");
            BookingError::BookingFailed(e)
        })?;
        info!(order_id = %order.id, offer_id, attendee_id = %attendee.id, "Provider hold created");

        let fields = new_itinerary(&attendee, &snapshot, &offer, &order, now);
        match self.persist_hold(&fields, &order.slices).await {
            Ok(detail) => {
                self.announce(TOPIC_ITINERARY_HELD, &detail.itinerary).await;
                Ok(detail)
            }
            Err(source) => {
                error!(
                    order_id = %order.id,
                    attendee_id = %attendee.id,
                    event_id = %event_id,
                    error = %source,
                    "Provider order held but itinerary could not be recorded"
                );
                self.compensate(&order.id, &attendee, &source).await;
                Err(BookingError::BookingPersistenceFailed {
                    order_id: order.id,
                    source,
                })
            }
        }
    }

    /// Pays the held order and approves its itinerary. A second call for
    /// the same order while one is in flight is refused, not queued.
    pub async fn pay(&self, order_id: &str) -> Result<Itinerary, BookingError> {
        let _claim = self
            .payments
            .claim(order_id)
            .ok_or_else(|| BookingError::PaymentInProgress(order_id.to_string()))?;

        let itinerary = self
            .itineraries
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| BookingError::ItineraryNotFound(order_id.to_string()))?;

        Transition::Approve
            .check(itinerary.approval_status)
            .map_err(transition_error)?;

        let now = Utc::now();
        if itinerary.is_hold_expired(now) {
            return Err(BookingError::HoldExpired(order_id.to_string()));
        }
        if itinerary.currency != self.settings.payment_currency {
            return Err(BookingError::InvalidRequest(format!(
                "order {} is priced in {} but payments are made in {}",
                order_id, itinerary.currency, self.settings.payment_currency
            )));
        }

        let payment = self
            .provider
            .pay(order_id, itinerary.total_cost, &itinerary.currency)
            .await
            .map_err(|e| {
                warn!(order_id, error = %e, "Provider payment failed");
                BookingError::PaymentFailed(e)
            })?;
        info!(order_id, payment_id = %payment.id, amount = %payment.amount, "Provider payment confirmed");

        let approved = self
            .itineraries
            .update_status(itinerary.id, Transition::Approve, now)
            .await
            .map_err(|source| {
                error!(
                    order_id,
                    itinerary_id = %itinerary.id,
                    payment_id = %payment.id,
                    error = %source,
                    "Provider charged but approval could not be recorded"
                );
                BookingError::BookingPersistenceFailed {
                    order_id: order_id.to_string(),
                    source,
                }
            })?;

        self.announce(TOPIC_ITINERARY_APPROVED, &approved).await;
        Ok(approved)
    }

    /// Declines a pending hold. The provider is not contacted; unpaid holds
    /// lapse on their own.
    pub async fn decline_pending_flight(&self, itinerary_id: Uuid) -> Result<Itinerary, BookingError> {
        let itinerary = self.find(itinerary_id).await?;
        Transition::Decline
            .check(itinerary.approval_status)
            .map_err(transition_error)?;

        let declined = self
            .itineraries
            .update_status(itinerary_id, Transition::Decline, Utc::now())
            .await?;
        info!(itinerary_id = %itinerary_id, "Pending flight declined");

        self.announce(TOPIC_ITINERARY_DENIED, &declined).await;
        Ok(declined)
    }

    /// Cancels an approved booking with the provider, then marks it denied.
    pub async fn cancel_approved_flight(&self, itinerary_id: Uuid) -> Result<Itinerary, BookingError> {
        let itinerary = self.find(itinerary_id).await?;
        Transition::Cancel
            .check(itinerary.approval_status)
            .map_err(transition_error)?;

        let order_id = itinerary
            .provider_order_id
            .clone()
            .ok_or(BookingError::NoProviderOrder(itinerary_id))?;

        let confirmation = self.cancel_with_provider(&order_id).await.map_err(|e| {
            warn!(order_id = %order_id, itinerary_id = %itinerary_id, error = %e, "Provider cancellation failed");
            e
        })?;

        let cancelled = self
            .itineraries
            .update_status(itinerary_id, Transition::Cancel, Utc::now())
            .await
            .map_err(|e| {
                error!(
                    order_id = %order_id,
                    cancellation_id = %confirmation.id,
                    error = %e,
                    "Provider cancelled but local status could not be updated"
                );
                BookingError::from(e)
            })?;
        info!(itinerary_id = %itinerary_id, order_id = %order_id, "Approved flight cancelled");

        self.announce(TOPIC_ITINERARY_DENIED, &cancelled).await;
        Ok(cancelled)
    }

    pub async fn itinerary_detail(&self, itinerary_id: Uuid) -> Result<ItineraryDetail, BookingError> {
        self.itineraries
            .load_detail(itinerary_id)
            .await?
            .ok_or_else(|| BookingError::ItineraryNotFound(itinerary_id.to_string()))
    }

    async fn find(&self, itinerary_id: Uuid) -> Result<Itinerary, BookingError> {
        self.itineraries
            .find_by_id(itinerary_id)
            .await?
            .ok_or_else(|| BookingError::ItineraryNotFound(itinerary_id.to_string()))
    }

    async fn attendee(&self, user_id: Uuid, event_id: Uuid) -> Result<Attendee, BookingError> {
        self.directory
            .find_attendee(user_id, event_id)
            .await?
            .ok_or(BookingError::AttendeeNotFound { user_id, event_id })
    }

    async fn budget_snapshot(&self, attendee: &Attendee) -> Result<BudgetSnapshot, BookingError> {
        let event = self
            .directory
            .find_event(attendee.event_id)
            .await?
            .ok_or(BookingError::EventNotFound(attendee.event_id))?;

        let group_id = attendee
            .event_group_id
            .ok_or(BookingError::MissingBudgetSnapshot(attendee.id))?;
        let group = self
            .directory
            .find_event_group(group_id)
            .await?
            .ok_or(BookingError::MissingBudgetSnapshot(attendee.id))?;

        Ok(BudgetPolicy::snapshot(&group, &event))
    }

    fn validate_offer(&self, offer: &Offer, now: DateTime<Utc>) -> Result<(), BookingError> {
        let refuse = |reason: &str| {
            Err(BookingError::OfferNotBookable {
                offer_id: offer.id.clone(),
                reason: reason.to_string(),
            })
        };

        if offer.expires_at <= now {
            return refuse("offer has expired");
        }
        if offer.live_mode != self.settings.live_mode {
            return refuse("offer live mode does not match this deployment");
        }
        if offer.available_services.is_empty() {
            return refuse("offer has no available services");
        }
        if offer.total_currency != self.settings.payment_currency {
            return refuse("offer is priced in a currency the provider balance cannot pay");
        }
        Ok(())
    }

    async fn persist_hold(
        &self,
        fields: &NewItinerary,
        slices: &[ProviderSlice],
    ) -> Result<ItineraryDetail, StoreError> {
        let mut tx = self.itineraries.begin().await?;

        match write_hold(tx.as_mut(), fields, slices).await {
            Ok(detail) => {
                tx.commit().await?;
                Ok(detail)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(order_id = %fields.provider_order_id, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Quote, check expiry, confirm, check confirmation.
    async fn cancel_with_provider(&self, order_id: &str) -> Result<CancellationQuote, BookingError> {
        let quote = self
            .provider
            .request_cancellation_quote(order_id)
            .await
            .map_err(BookingError::CancellationFailed)?;

        if quote.expires_at <= Utc::now() {
            return Err(BookingError::QuoteExpired(quote.id));
        }

        let confirmed = self
            .provider
            .confirm_cancellation(&quote.id)
            .await
            .map_err(BookingError::CancellationFailed)?;

        if confirmed.confirmed_at.is_none() {
            return Err(BookingError::CancellationNotConfirmed(confirmed.id));
        }
        Ok(confirmed)
    }

    async fn compensate(&self, order_id: &str, attendee: &Attendee, cause: &StoreError) {
        if self.settings.compensate_failed_holds {
            match self.cancel_with_provider(order_id).await {
                Ok(confirmed) => {
                    warn!(order_id, cancellation_id = %confirmed.id, "Unrecorded hold cancelled with provider");
                    return;
                }
                Err(e) => {
                    error!(order_id, error = %e, "Compensating cancellation failed, provider order needs reconciliation");
                }
            }
        }

        let event = ReconcileRequiredEvent {
            provider_order_id: order_id.to_string(),
            event_id: attendee.event_id,
            attendee_id: attendee.id,
            detail: cause.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(TOPIC_ITINERARY_RECONCILE, order_id, &event).await;
    }

    pub(crate) async fn announce(&self, topic: &str, itinerary: &Itinerary) {
        let event = ItineraryStatusEvent {
            itinerary_id: itinerary.id,
            event_id: itinerary.event_id,
            attendee_id: itinerary.attendee_id,
            provider_order_id: itinerary.provider_order_id.clone(),
            status: itinerary.approval_status.to_string(),
            reason: itinerary.denial_reason.map(|r| r.as_str().to_string()),
            total_cost: itinerary.total_cost.to_string(),
            currency: itinerary.currency.clone(),
            timestamp: Utc::now().timestamp(),
        };
        self.publish(topic, &itinerary.id.to_string(), &event).await;
    }

    async fn publish<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                if let Err(e) = self.events.publish(topic, key, &payload).await {
                    warn!(topic, key, error = %e, "Event not published");
                }
            }
            Err(e) => warn!(topic, key, error = %e, "Event not serializable"),
        }
    }
}

fn transition_error(e: TransitionError) -> BookingError {
    match e {
        TransitionError::Illegal { from, to } => BookingError::InvalidTransition { from, to },
        TransitionError::UnknownStatus(status) => BookingError::Store(StoreError::Corrupt(status)),
    }
}

fn check_offer_id(offer_id: &str) -> Result<(), BookingError> {
    if is_provider_id(offer_id) {
        Ok(())
    } else {
        Err(BookingError::InvalidRequest(format!("malformed offer id {:?}", offer_id)))
    }
}

fn validate_search(search: &OfferSearch) -> Result<(), BookingError> {
    let is_iata = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());

    if !is_iata(&search.origin) || !is_iata(&search.destination) {
        return Err(BookingError::InvalidRequest(
            "origin and destination must be 3-letter IATA codes".to_string(),
        ));
    }
    if search.origin == search.destination {
        return Err(BookingError::InvalidRequest("origin and destination must differ".to_string()));
    }
    if search.return_date < search.departure_date {
        return Err(BookingError::InvalidRequest("return_date is before departure_date".to_string()));
    }
    Ok(())
}

/// Matches caller-supplied passengers to the offer's passengers, filling in
/// missing IDs in order.
fn assign_passenger_ids(
    offer: &Offer,
    passengers: Vec<PassengerDetails>,
) -> Result<Vec<PassengerDetails>, BookingError> {
    if passengers.is_empty() || passengers.len() != offer.passengers.len() {
        return Err(BookingError::InvalidRequest(format!(
            "offer {} needs {} passenger(s), got {}",
            offer.id,
            offer.passengers.len(),
            passengers.len()
        )));
    }

    passengers
        .into_iter()
        .zip(&offer.passengers)
        .map(|(mut passenger, slot)| {
            let known = passenger
                .id
                .as_ref()
                .map(|id| offer.passengers.iter().any(|p| &p.id == id));
            match known {
                Some(true) => Ok(passenger),
                Some(false) => Err(BookingError::InvalidRequest(format!(
                    "passenger {} is not part of offer {}",
                    passenger.id.unwrap_or_default(),
                    offer.id
                ))),
                None => {
                    passenger.id = Some(slot.id.clone());
                    Ok(passenger)
                }
            }
        })
        .collect()
}

fn new_itinerary(
    attendee: &Attendee,
    snapshot: &BudgetSnapshot,
    offer: &Offer,
    order: &ProviderOrder,
    now: DateTime<Utc>,
) -> NewItinerary {
    let tax_cost = order.tax_amount.or(offer.tax_amount).unwrap_or(Decimal::ZERO);
    let base_cost = order
        .base_amount
        .or(offer.base_amount)
        .unwrap_or(order.total_amount - tax_cost);

    NewItinerary {
        attendee_id: attendee.id,
        event_id: attendee.event_id,
        provider_order_id: order.id.clone(),
        provider_passenger_id: order
            .passengers
            .first()
            .or(offer.passengers.first())
            .map(|p| p.id.clone()),
        provider_offer_id: offer.id.clone(),
        booking_reference: order.booking_reference.clone(),
        total_cost: order.total_amount,
        base_cost,
        tax_cost,
        currency: order.total_currency.clone(),
        budget_on_book: snapshot.flight_budget,
        threshold_on_book: snapshot.threshold,
        group_name: snapshot.group_name.clone(),
        held_at: now,
        expires_at: order.payment_status.payment_required_by,
    }
}

fn minutes(duration: Option<&str>) -> Option<i32> {
    let raw = duration?;
    match parse_duration_minutes(raw) {
        Ok(minutes) => Some(minutes),
        Err(e) => {
            warn!(duration = raw, error = %e, "Unparseable provider duration, stored without one");
            None
        }
    }
}

/// Itinerary, then each slice in provider order, then each slice's segments.
async fn write_hold(
    tx: &mut dyn ItineraryTx,
    fields: &NewItinerary,
    slices: &[ProviderSlice],
) -> Result<ItineraryDetail, StoreError> {
    let itinerary = tx.create_itinerary(fields).await?;

    let mut stored_slices = Vec::with_capacity(slices.len());
    for (slice_position, slice) in slices.iter().enumerate() {
        let stored = tx
            .create_slice(
                itinerary.id,
                &NewSlice {
                    position: slice_position as i32,
                    origin: (&slice.origin).into(),
                    destination: (&slice.destination).into(),
                    duration_minutes: minutes(slice.duration.as_deref()),
                },
            )
            .await?;

        let mut segments = Vec::with_capacity(slice.segments.len());
        for (segment_position, segment) in slice.segments.iter().enumerate() {
            segments.push(
                tx.create_segment(
                    stored.id,
                    &NewSegment {
                        position: segment_position as i32,
                        origin: (&segment.origin).into(),
                        destination: (&segment.destination).into(),
                        departing_at: segment.departing_at.clone(),
                        arriving_at: segment.arriving_at.clone(),
                        duration_minutes: minutes(segment.duration.as_deref()),
                    },
                )
                .await?,
            );
        }

        stored_slices.push(SliceDetail {
            slice: stored,
            segments,
        });
    }

    Ok(ItineraryDetail {
        itinerary,
        slices: stored_slices,
    })
}
