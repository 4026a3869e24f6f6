use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use junket_booking::{BookingError, BookingOrchestrator, BookingSettings};
use junket_core::directory::{Event, EventGroup};
use junket_core::itinerary::{ApprovalStatus, DenialReason, NewItinerary, Transition};
use junket_core::provider::{OfferSearch, PassengerDetails, ProviderError};
use junket_core::repository::ItineraryStore;
use junket_duffel::{MockProvider, ProviderOperation};
use junket_shared::Masked;
use junket_store::{FaultPlan, MemoryDirectory, MemoryItineraryStore, RecordingPublisher};
use rust_decimal::Decimal;
use uuid::Uuid;

struct Harness {
    orchestrator: BookingOrchestrator,
    provider: Arc<MockProvider>,
    store: Arc<MemoryItineraryStore>,
    directory: Arc<MemoryDirectory>,
    events: Arc<RecordingPublisher>,
    user: Uuid,
    event: Event,
    group: EventGroup,
}

fn dec(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

fn traveller() -> PassengerDetails {
    PassengerDetails {
        id: None,
        title: "mr".to_string(),
        given_name: "Alan".to_string(),
        family_name: "Turing".to_string(),
        gender: "m".to_string(),
        born_on: NaiveDate::from_ymd_opt(1988, 6, 23).unwrap(),
        email: Masked::from("alan@example.com"),
        phone_number: Masked::from("+442071838750"),
    }
}

async fn harness_with(settings: BookingSettings) -> Harness {
    let directory = Arc::new(MemoryDirectory::new());
    let event = directory.add_event("RustConf", dec(50)).await;
    let group = directory.add_group(event.id, "Speakers", dec(400)).await;
    let user = Uuid::new_v4();
    directory.add_attendee(user, event.id, Some(group.id)).await;

    let store = Arc::new(MemoryItineraryStore::new(directory.clone()));
    let provider = Arc::new(MockProvider::new());
    provider
        .add_offer(MockProvider::round_trip_offer("off_1", "JFK", "LAX", Decimal::new(25000, 2)))
        .await;
    let events = Arc::new(RecordingPublisher::new());

    let orchestrator = BookingOrchestrator::new(
        provider.clone(),
        store.clone(),
        directory.clone(),
        events.clone(),
        settings,
    );

    Harness {
        orchestrator,
        provider,
        store,
        directory,
        events,
        user,
        event,
        group,
    }
}

async fn harness() -> Harness {
    harness_with(BookingSettings::default()).await
}

impl Harness {
    async fn hold(&self) -> Result<junket_core::itinerary::ItineraryDetail, BookingError> {
        self.orchestrator
            .hold(self.user, self.event.id, "off_1", vec![traveller()])
            .await
    }
}

#[tokio::test]
async fn test_scenario_a_hold_records_itinerary_with_slices() {
    let h = harness().await;

    let detail = h.hold().await.unwrap();
    let itinerary = &detail.itinerary;

    assert_eq!(itinerary.provider_order_id.as_deref(), Some("ord_1"));
    assert_eq!(itinerary.approval_status, ApprovalStatus::Pending);
    assert_eq!(itinerary.total_cost, Decimal::new(25000, 2));
    assert_eq!(itinerary.budget_on_book, dec(400));
    assert_eq!(itinerary.threshold_on_book, dec(50));
    assert_eq!(itinerary.group_name, "Speakers");
    assert_eq!(itinerary.provider_passenger_id.as_deref(), Some("pas_off_1"));
    assert!(itinerary.expires_at.is_some());

    assert_eq!(detail.slices.len(), 2);
    assert_eq!(detail.segment_count(), 2);
    assert_eq!(detail.slices[0].slice.origin.iata_code, "JFK");
    assert_eq!(detail.slices[1].slice.origin.iata_code, "LAX");
    assert_eq!(detail.slices[0].slice.duration_minutes, Some(150));
    assert_eq!(detail.slices[0].segments[0].departing_at, "2026-11-02T08:00:00");

    assert_eq!(h.store.row_counts().await, (1, 2, 2));
    assert_eq!(h.events.topics().await, vec!["itinerary.held"]);

    let loaded = h.orchestrator.itinerary_detail(itinerary.id).await.unwrap();
    assert_eq!(loaded, detail);
}

#[tokio::test]
async fn test_scenario_b_pay_approves() {
    let h = harness().await;
    h.hold().await.unwrap();

    let approved = h.orchestrator.pay("ord_1").await.unwrap();

    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert!(approved.approved_at.is_some());
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 1);
    assert_eq!(h.events.topics().await, vec!["itinerary.held", "itinerary.approved"]);
}

#[tokio::test]
async fn test_scenario_c_cancel_approved_flight() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.orchestrator.pay("ord_1").await.unwrap();

    let cancelled = h
        .orchestrator
        .cancel_approved_flight(detail.itinerary.id)
        .await
        .unwrap();

    assert_eq!(cancelled.approval_status, ApprovalStatus::Denied);
    assert_eq!(cancelled.denial_reason, Some(DenialReason::Cancelled));
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(h.provider.calls_to(ProviderOperation::RequestCancellationQuote).await, 1);
    assert_eq!(h.provider.calls_to(ProviderOperation::ConfirmCancellation).await, 1);
    assert_eq!(h.events.topics().await.last().map(String::as_str), Some("itinerary.denied"));
}

#[tokio::test]
async fn test_scenario_d_decline_makes_no_provider_call() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    let calls_before = h.provider.calls().await.len();

    let declined = h
        .orchestrator
        .decline_pending_flight(detail.itinerary.id)
        .await
        .unwrap();

    assert_eq!(declined.approval_status, ApprovalStatus::Denied);
    assert_eq!(declined.denial_reason, Some(DenialReason::Declined));
    assert!(declined.cancelled_at.is_some());
    assert_eq!(h.provider.calls().await.len(), calls_before);
}

#[tokio::test]
async fn test_failed_write_leaves_no_rows_and_compensates() {
    let plans = [
        FaultPlan { fail_itinerary: true, ..FaultPlan::default() },
        FaultPlan { fail_slice: Some(0), ..FaultPlan::default() },
        FaultPlan { fail_slice: Some(1), ..FaultPlan::default() },
        FaultPlan { fail_segment: Some(0), ..FaultPlan::default() },
        FaultPlan { fail_segment: Some(1), ..FaultPlan::default() },
        FaultPlan { fail_commit: true, ..FaultPlan::default() },
    ];

    for plan in plans {
        let h = harness().await;
        h.store.inject(plan.clone()).await;

        let err = h.hold().await.unwrap_err();

        match err {
            BookingError::BookingPersistenceFailed { order_id, .. } => assert_eq!(order_id, "ord_1"),
            other => panic!("{:?}: unexpected {:?}", plan, other),
        }
        assert_eq!(h.store.row_counts().await, (0, 0, 0), "{:?}", plan);
        assert!(h.store.find_by_order_id("ord_1").await.unwrap().is_none());
        assert_eq!(h.provider.calls_to(ProviderOperation::ConfirmCancellation).await, 1);
        assert!(h.events.topics().await.is_empty(), "{:?}", plan);
    }
}

#[tokio::test]
async fn test_failed_compensation_requests_reconciliation() {
    let h = harness().await;
    h.store
        .inject(FaultPlan { fail_commit: true, ..FaultPlan::default() })
        .await;
    h.provider
        .fail_next(
            ProviderOperation::RequestCancellationQuote,
            ProviderError::Unavailable("HTTP 503".to_string()),
        )
        .await;

    assert!(h.hold().await.is_err());

    let published = h.events.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "itinerary.reconcile");
    assert_eq!(published[0].key, "ord_1");
    assert!(published[0].payload.contains("ord_1"));
}

#[tokio::test]
async fn test_compensation_can_be_disabled() {
    let h = harness_with(BookingSettings {
        compensate_failed_holds: false,
        ..BookingSettings::default()
    })
    .await;
    h.store
        .inject(FaultPlan { fail_itinerary: true, ..FaultPlan::default() })
        .await;

    assert!(h.hold().await.is_err());
    assert_eq!(h.provider.calls_to(ProviderOperation::RequestCancellationQuote).await, 0);
    assert_eq!(h.events.topics().await, vec!["itinerary.reconcile"]);
}

#[tokio::test]
async fn test_expired_quote_keeps_booking_approved() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.orchestrator.pay("ord_1").await.unwrap();
    h.provider.set_quote_ttl(Duration::minutes(-1)).await;

    let err = h
        .orchestrator
        .cancel_approved_flight(detail.itinerary.id)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::QuoteExpired(_)));
    assert_eq!(h.provider.calls_to(ProviderOperation::ConfirmCancellation).await, 0);
    let current = h.store.find_by_id(detail.itinerary.id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Approved);
    assert!(current.cancelled_at.is_none());
}

#[tokio::test]
async fn test_unconfirmed_cancellation_keeps_booking_approved() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.orchestrator.pay("ord_1").await.unwrap();
    h.provider.set_confirms_cancellations(false).await;

    let err = h
        .orchestrator
        .cancel_approved_flight(detail.itinerary.id)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::CancellationNotConfirmed(_)));
    let current = h.store.find_by_id(detail.itinerary.id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn test_budget_snapshot_survives_group_edit() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();

    h.directory.set_group_budget(h.group.id, dec(9000)).await;

    let stored = h.store.find_by_id(detail.itinerary.id).await.unwrap().unwrap();
    assert_eq!(stored.budget_on_book, dec(400));

    let report = h.orchestrator.finance_report(h.event.id).await.unwrap();
    assert_eq!(report.lines[0].budget_on_book, dec(400));
}

#[tokio::test]
async fn test_paying_twice_charges_once() {
    let h = harness().await;
    h.hold().await.unwrap();
    h.orchestrator.pay("ord_1").await.unwrap();

    let err = h.orchestrator.pay("ord_1").await.unwrap_err();

    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: ApprovalStatus::Approved,
            to: ApprovalStatus::Approved
        }
    ));
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 1);
}

#[tokio::test]
async fn test_concurrent_pays_charge_once() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.provider.set_pay_latency(std::time::Duration::from_millis(50)).await;

    let (first, second) = tokio::join!(h.orchestrator.pay("ord_1"), h.orchestrator.pay("ord_1"));

    assert!(first.is_ok());
    assert!(matches!(second, Err(BookingError::PaymentInProgress(ref id)) if id == "ord_1"));
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 1);
    let current = h.store.find_by_id(detail.itinerary.id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Approved);

    // The claim is released once the first payment returns.
    let err = h.orchestrator.pay("ord_1").await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { from: ApprovalStatus::Approved, .. }));
}

#[tokio::test]
async fn test_offer_in_foreign_currency_is_not_held() {
    let h = harness().await;
    let mut offer = MockProvider::round_trip_offer("off_gbp", "LHR", "JFK", Decimal::new(30000, 2));
    offer.total_currency = "GBP".to_string();
    h.provider.add_offer(offer).await;

    let err = h
        .orchestrator
        .hold(h.user, h.event.id, "off_gbp", vec![traveller()])
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::OfferNotBookable { ref offer_id, .. } if offer_id == "off_gbp"));
    assert_eq!(h.provider.calls_to(ProviderOperation::HoldOrder).await, 0);
}

#[tokio::test]
async fn test_pay_refuses_itinerary_in_foreign_currency() {
    let h = harness().await;
    let attendee_id = Uuid::new_v4();
    let pending = NewItinerary {
        attendee_id,
        event_id: h.event.id,
        provider_order_id: "ord_eur".to_string(),
        provider_passenger_id: None,
        provider_offer_id: "off_eur".to_string(),
        booking_reference: None,
        total_cost: dec(300),
        base_cost: dec(250),
        tax_cost: dec(50),
        currency: "EUR".to_string(),
        budget_on_book: dec(400),
        threshold_on_book: dec(50),
        group_name: "Speakers".to_string(),
        held_at: Utc::now(),
        expires_at: None,
    }
    .into_itinerary(Uuid::new_v4());
    h.store.seed(pending.clone()).await;

    let err = h.orchestrator.pay("ord_eur").await.unwrap_err();

    assert!(matches!(err, BookingError::InvalidRequest(ref msg) if msg.contains("EUR")));
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 0);
    let current = h.store.find_by_id(pending.id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn test_malformed_offer_id_never_reaches_provider() {
    let h = harness().await;

    let err = h
        .orchestrator
        .hold(h.user, h.event.id, "../orders", vec![traveller()])
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidRequest(_)));

    let err = h.orchestrator.get_offer("off_1/actions/confirm").await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidRequest(_)));

    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_pay_unknown_order() {
    let h = harness().await;
    let err = h.orchestrator.pay("ord_missing").await.unwrap_err();
    assert!(matches!(err, BookingError::ItineraryNotFound(_)));
}

#[tokio::test]
async fn test_pay_refused_after_hold_deadline() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.store
        .set_expires_at(detail.itinerary.id, Some(Utc::now() - Duration::minutes(5)))
        .await;

    let err = h.orchestrator.pay("ord_1").await.unwrap_err();

    assert!(matches!(err, BookingError::HoldExpired(_)));
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 0);
}

#[tokio::test]
async fn test_payment_failure_leaves_pending() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    h.provider
        .fail_next(ProviderOperation::Pay, ProviderError::Unavailable("HTTP 502".to_string()))
        .await;

    let err = h.orchestrator.pay("ord_1").await.unwrap_err();

    assert!(matches!(err, BookingError::PaymentFailed(_)));
    let current = h.store.find_by_id(detail.itinerary.id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Pending);
}

#[tokio::test]
async fn test_charged_but_unrecorded_payment_is_reported() {
    let h = harness().await;
    h.hold().await.unwrap();
    h.store
        .inject(FaultPlan { fail_status_update: true, ..FaultPlan::default() })
        .await;

    let err = h.orchestrator.pay("ord_1").await.unwrap_err();

    assert!(matches!(err, BookingError::BookingPersistenceFailed { ref order_id, .. } if order_id == "ord_1"));
    assert_eq!(h.provider.calls_to(ProviderOperation::Pay).await, 1);
}

#[tokio::test]
async fn test_wrong_state_transitions_leave_status() {
    let h = harness().await;
    let detail = h.hold().await.unwrap();
    let id = detail.itinerary.id;

    let err = h.orchestrator.cancel_approved_flight(id).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { from: ApprovalStatus::Pending, .. }));

    h.orchestrator.pay("ord_1").await.unwrap();
    let err = h.orchestrator.decline_pending_flight(id).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { from: ApprovalStatus::Approved, .. }));

    let current = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(current.approval_status, ApprovalStatus::Approved);
    assert!(current.cancelled_at.is_none());
}

#[tokio::test]
async fn test_cancel_requires_provider_order() {
    let h = harness().await;
    let attendee_id = Uuid::new_v4();
    let mut orphan = NewItinerary {
        attendee_id,
        event_id: h.event.id,
        provider_order_id: "ord_legacy".to_string(),
        provider_passenger_id: None,
        provider_offer_id: "off_legacy".to_string(),
        booking_reference: None,
        total_cost: dec(100),
        base_cost: dec(100),
        tax_cost: Decimal::ZERO,
        currency: "USD".to_string(),
        budget_on_book: dec(400),
        threshold_on_book: dec(50),
        group_name: "Speakers".to_string(),
        held_at: Utc::now(),
        expires_at: None,
    }
    .into_itinerary(Uuid::new_v4());
    orphan.apply(Transition::Approve, Utc::now()).unwrap();
    orphan.provider_order_id = None;
    h.store.seed(orphan.clone()).await;

    let err = h.orchestrator.cancel_approved_flight(orphan.id).await.unwrap_err();
    assert!(matches!(err, BookingError::NoProviderOrder(id) if id == orphan.id));
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_unknown_itinerary() {
    let h = harness().await;
    let err = h.orchestrator.decline_pending_flight(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, BookingError::ItineraryNotFound(_)));
}

#[tokio::test]
async fn test_non_attendee_rejected_before_provider() {
    let h = harness().await;

    let err = h
        .orchestrator
        .hold(Uuid::new_v4(), h.event.id, "off_1", vec![traveller()])
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::AttendeeNotFound { .. }));
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_attendee_without_group_has_no_budget() {
    let h = harness().await;
    let loner = Uuid::new_v4();
    h.directory.add_attendee(loner, h.event.id, None).await;

    let err = h
        .orchestrator
        .hold(loner, h.event.id, "off_1", vec![traveller()])
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::MissingBudgetSnapshot(_)));
    assert!(h.provider.calls().await.is_empty());
}

#[tokio::test]
async fn test_expired_offer_refused_before_hold() {
    let h = harness().await;
    let mut stale = MockProvider::round_trip_offer("off_stale", "JFK", "SFO", dec(300));
    stale.expires_at = Utc::now() - Duration::minutes(1);
    h.provider.add_offer(stale).await;

    let err = h
        .orchestrator
        .hold(h.user, h.event.id, "off_stale", vec![traveller()])
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::OfferNotBookable { .. }));
    assert_eq!(h.provider.calls_to(ProviderOperation::HoldOrder).await, 0);
}

#[tokio::test]
async fn test_live_offer_refused_in_test_mode() {
    let h = harness().await;
    let mut live = MockProvider::round_trip_offer("off_live", "JFK", "SFO", dec(300));
    live.live_mode = true;
    h.provider.add_offer(live).await;

    let err = h
        .orchestrator
        .hold(h.user, h.event.id, "off_live", vec![traveller()])
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::OfferNotBookable { .. }));
}

#[tokio::test]
async fn test_provider_hold_failure_writes_nothing() {
    let h = harness().await;
    h.provider
        .fail_next(ProviderOperation::HoldOrder, ProviderError::Unavailable("HTTP 500".to_string()))
        .await;

    let err = h.hold().await.unwrap_err();

    assert!(matches!(err, BookingError::BookingFailed(_)));
    assert_eq!(h.store.row_counts().await, (0, 0, 0));
    assert!(h.events.topics().await.is_empty());
}

#[tokio::test]
async fn test_expiry_sweep_lapses_only_overdue_pending() {
    let h = harness().await;
    let paid = h.hold().await.unwrap();
    h.orchestrator.pay("ord_1").await.unwrap();
    let overdue = h.hold().await.unwrap();
    let fresh = h.hold().await.unwrap();

    let past = Some(Utc::now() - Duration::minutes(1));
    h.store.set_expires_at(paid.itinerary.id, past).await;
    h.store.set_expires_at(overdue.itinerary.id, past).await;

    let lapsed = h.orchestrator.lapse_expired_holds(Utc::now()).await.unwrap();
    assert_eq!(lapsed, 1);

    let overdue = h.store.find_by_id(overdue.itinerary.id).await.unwrap().unwrap();
    assert_eq!(overdue.approval_status, ApprovalStatus::Denied);
    assert_eq!(overdue.denial_reason, Some(DenialReason::Lapsed));

    let paid = h.store.find_by_id(paid.itinerary.id).await.unwrap().unwrap();
    assert_eq!(paid.approval_status, ApprovalStatus::Approved);
    let fresh = h.store.find_by_id(fresh.itinerary.id).await.unwrap().unwrap();
    assert_eq!(fresh.approval_status, ApprovalStatus::Pending);

    assert_eq!(h.orchestrator.lapse_expired_holds(Utc::now()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_returns_first_page() {
    let h = harness().await;
    let search = OfferSearch {
        origin: "JFK".to_string(),
        destination: "LAX".to_string(),
        departure_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
        return_date: NaiveDate::from_ymd_opt(2026, 11, 6).unwrap(),
        cabin_class: None,
    };

    let result = h
        .orchestrator
        .search_flights(h.user, h.event.id, &search, 2)
        .await
        .unwrap();
    assert_eq!(result.page.offers.len(), 2);
    assert!(result.page.after.is_some());
    assert!(result.offer_request_id.starts_with("orq_"));

    let err = h
        .orchestrator
        .search_flights(Uuid::new_v4(), h.event.id, &search, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AttendeeNotFound { .. }));
}
