use uuid::Uuid;

pub const TOPIC_ITINERARY_HELD: &str = "itinerary.held";
pub const TOPIC_ITINERARY_APPROVED: &str = "itinerary.approved";
pub const TOPIC_ITINERARY_DENIED: &str = "itinerary.denied";
pub const TOPIC_ITINERARY_RECONCILE: &str = "itinerary.reconcile";

/// Emitted after every committed itinerary state change.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ItineraryStatusEvent {
    pub itinerary_id: Uuid,
    pub event_id: Uuid,
    pub attendee_id: Uuid,
    pub provider_order_id: Option<String>,
    pub status: String,
    pub reason: Option<String>,
    pub total_cost: String,
    pub currency: String,
    pub timestamp: i64,
}

/// Emitted when a provider order exists with no local itinerary behind it
/// and the compensating cancellation did not go through either.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReconcileRequiredEvent {
    pub provider_order_id: String,
    pub event_id: Uuid,
    pub attendee_id: Uuid,
    pub detail: String,
    pub timestamp: i64,
}
