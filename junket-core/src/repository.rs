use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::directory::{Attendee, Event, EventGroup, RoleSet};
use crate::itinerary::{
    ApprovalStatus, Itinerary, ItineraryDetail, ItinerarySlice, NewItinerary, NewSegment, NewSlice,
    Segment, Transition,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Writes for one hold, all inside one database transaction. Dropping the
/// handle without `commit` discards every write.
#[async_trait]
pub trait ItineraryTx: Send {
    async fn create_itinerary(&mut self, fields: &NewItinerary) -> Result<Itinerary, StoreError>;

    async fn create_slice(
        &mut self,
        itinerary_id: Uuid,
        fields: &NewSlice,
    ) -> Result<ItinerarySlice, StoreError>;

    async fn create_segment(&mut self, slice_id: Uuid, fields: &NewSegment) -> Result<Segment, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Repository for itineraries and their slices/segments.
#[async_trait]
pub trait ItineraryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ItineraryTx>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Itinerary>, StoreError>;

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Itinerary>, StoreError>;

    async fn load_detail(&self, id: Uuid) -> Result<Option<ItineraryDetail>, StoreError>;

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Itinerary>, StoreError>;

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Itinerary>, StoreError>;

    /// Compare-and-set on the current status. Fails with `InvalidTransition`
    /// when the row is not in `transition.from_status()`, `NotFound` when
    /// the row does not exist.
    async fn update_status(
        &self,
        id: Uuid,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<Itinerary, StoreError>;
}

/// Read-only lookups into attendee/event/group data owned elsewhere.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_attendee(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<Attendee>, StoreError>;

    async fn find_event_group(&self, group_id: Uuid) -> Result<Option<EventGroup>, StoreError>;

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn event_roles(&self, user_id: Uuid, event_id: Uuid) -> Result<RoleSet, StoreError>;
}

/// Rejects blank provider identifiers before anything reaches the database.
pub fn validate_new_itinerary(fields: &NewItinerary) -> Result<(), StoreError> {
    if fields.provider_order_id.trim().is_empty() {
        return Err(StoreError::Constraint("provider_order_id is required".to_string()));
    }
    if fields.provider_offer_id.trim().is_empty() {
        return Err(StoreError::Constraint("provider_offer_id is required".to_string()));
    }
    if fields.currency.trim().is_empty() {
        return Err(StoreError::Constraint("currency is required".to_string()));
    }
    Ok(())
}
