use junket_core::itinerary::ApprovalStatus;
use junket_core::provider::ProviderError;
use junket_core::repository::StoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("User {user_id} is not an attendee of event {event_id}")]
    AttendeeNotFound { user_id: Uuid, event_id: Uuid },

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Attendee {0} has no event group to take a flight budget from")]
    MissingBudgetSnapshot(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Offer {offer_id} is not bookable: {reason}")]
    OfferNotBookable { offer_id: String, reason: String },

    #[error("Flight provider error: {0}")]
    Provider(#[source] ProviderError),

    #[error("Provider hold failed: {0}")]
    BookingFailed(#[source] ProviderError),

    #[error("Provider order {order_id} could not be recorded locally: {source}")]
    BookingPersistenceFailed {
        order_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Itinerary not found: {0}")]
    ItineraryNotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Hold on provider order {0} has expired")]
    HoldExpired(String),

    #[error("A payment for order {0} is already in progress")]
    PaymentInProgress(String),

    #[error("Provider payment failed: {0}")]
    PaymentFailed(#[source] ProviderError),

    #[error("Itinerary {0} has no provider order")]
    NoProviderOrder(Uuid),

    #[error("Provider cancellation failed: {0}")]
    CancellationFailed(#[source] ProviderError),

    #[error("Cancellation quote {0} has expired")]
    QuoteExpired(String),

    #[error("Cancellation {0} was not confirmed by the provider")]
    CancellationNotConfirmed(String),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidTransition { from, to } => BookingError::InvalidTransition { from, to },
            other => BookingError::Store(other),
        }
    }
}

impl BookingError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::AttendeeNotFound { .. } => "attendee_not_found",
            BookingError::EventNotFound(_) => "event_not_found",
            BookingError::MissingBudgetSnapshot(_) => "missing_budget_snapshot",
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::OfferNotBookable { .. } => "offer_not_bookable",
            BookingError::Provider(_) => "provider",
            BookingError::BookingFailed(_) => "booking_failed",
            BookingError::BookingPersistenceFailed { .. } => "booking_persistence_failed",
            BookingError::ItineraryNotFound(_) => "itinerary_not_found",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::HoldExpired(_) => "hold_expired",
            BookingError::PaymentInProgress(_) => "payment_in_progress",
            BookingError::PaymentFailed(_) => "payment_failed",
            BookingError::NoProviderOrder(_) => "no_provider_order",
            BookingError::CancellationFailed(_) => "cancellation_failed",
            BookingError::QuoteExpired(_) => "quote_expired",
            BookingError::CancellationNotConfirmed(_) => "cancellation_not_confirmed",
            BookingError::Store(_) => "store",
        }
    }
}
