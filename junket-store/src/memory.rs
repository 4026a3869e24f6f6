//! Process-local backend: directory, itinerary store, token denylist and a
//! recording event publisher. Used by the `memory` storage backend and by
//! tests, which can also inject write failures into hold transactions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use junket_core::directory::{Attendee, Event, EventGroup, RoleSet};
use junket_core::events::{EventPublisher, PublishError};
use junket_core::itinerary::{
    ApprovalStatus, Itinerary, ItineraryDetail, ItinerarySlice, NewItinerary, NewSegment, NewSlice, Segment, SliceDetail,
    Transition, TransitionError,
};
use junket_core::repository::{
    validate_new_itinerary, DirectoryRepository, ItineraryStore, ItineraryTx, StoreError,
};
use junket_core::session::{SessionStoreError, TokenDenylist};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct DirectoryTables {
    events: HashMap<Uuid, Event>,
    groups: HashMap<Uuid, EventGroup>,
    attendees: HashMap<Uuid, Attendee>,
    roles: HashMap<(Uuid, Uuid), RoleSet>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    tables: RwLock<DirectoryTables>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_event(&self, name: &str, flight_budget_threshold: Decimal) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: name.to_string(),
            flight_budget_threshold,
        };
        self.tables.write().await.events.insert(event.id, event.clone());
        event
    }

    pub async fn add_group(&self, event_id: Uuid, name: &str, flight_budget: Decimal) -> EventGroup {
        let group = EventGroup {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            flight_budget,
        };
        self.tables.write().await.groups.insert(group.id, group.clone());
        group
    }

    pub async fn add_attendee(&self, user_id: Uuid, event_id: Uuid, event_group_id: Option<Uuid>) -> Attendee {
        let attendee = Attendee {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            event_group_id,
        };
        self.tables.write().await.attendees.insert(attendee.id, attendee.clone());
        attendee
    }

    pub async fn grant_roles(&self, user_id: Uuid, event_id: Uuid, roles: RoleSet) {
        self.tables.write().await.roles.insert((user_id, event_id), roles);
    }

    pub async fn set_group_budget(&self, group_id: Uuid, flight_budget: Decimal) {
        if let Some(group) = self.tables.write().await.groups.get_mut(&group_id) {
            group.flight_budget = flight_budget;
        }
    }

    pub async fn remove_attendee(&self, attendee_id: Uuid) {
        self.tables.write().await.attendees.remove(&attendee_id);
    }

    async fn attendee_exists(&self, attendee_id: Uuid) -> bool {
        self.tables.read().await.attendees.contains_key(&attendee_id)
    }
}

#[async_trait]
impl DirectoryRepository for MemoryDirectory {
    async fn find_attendee(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<Attendee>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .attendees
            .values()
            .find(|a| a.user_id == user_id && a.event_id == event_id)
            .cloned())
    }

    async fn find_event_group(&self, group_id: Uuid) -> Result<Option<EventGroup>, StoreError> {
        Ok(self.tables.read().await.groups.get(&group_id).cloned())
    }

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.read().await.events.get(&event_id).cloned())
    }

    async fn event_roles(&self, user_id: Uuid, event_id: Uuid) -> Result<RoleSet, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .get(&(user_id, event_id))
            .copied()
            .unwrap_or_default())
    }
}

/// Write failures to inject into the next hold transactions.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    pub fail_itinerary: bool,
    /// Zero-based index of the slice write that fails.
    pub fail_slice: Option<usize>,
    /// Zero-based index, counted across all slices, of the segment write that fails.
    pub fail_segment: Option<usize>,
    pub fail_commit: bool,
    pub fail_status_update: bool,
}

#[derive(Default)]
struct ItineraryTables {
    itineraries: Vec<Itinerary>,
    slices: Vec<ItinerarySlice>,
    segments: Vec<Segment>,
}

pub struct MemoryItineraryStore {
    tables: Arc<Mutex<ItineraryTables>>,
    directory: Arc<MemoryDirectory>,
    faults: Mutex<FaultPlan>,
}

impl MemoryItineraryStore {
    /// Itineraries reference attendees in `directory`, like the foreign key
    /// in the Postgres schema.
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(ItineraryTables::default())),
            directory,
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    pub async fn inject(&self, plan: FaultPlan) {
        *self.faults.lock().await = plan;
    }

    /// Committed (itineraries, slices, segments).
    pub async fn row_counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.lock().await;
        (tables.itineraries.len(), tables.slices.len(), tables.segments.len())
    }

    /// Inserts a row directly, bypassing the hold transaction.
    pub async fn seed(&self, itinerary: Itinerary) {
        self.tables.lock().await.itineraries.push(itinerary);
    }

    /// Overwrites a row's payment deadline.
    pub async fn set_expires_at(&self, id: Uuid, expires_at: Option<DateTime<Utc>>) {
        if let Some(row) = self.tables.lock().await.itineraries.iter_mut().find(|i| i.id == id) {
            row.expires_at = expires_at;
        }
    }
}

pub struct MemoryItineraryTx {
    tables: Arc<Mutex<ItineraryTables>>,
    directory: Arc<MemoryDirectory>,
    faults: FaultPlan,
    staged: ItineraryTables,
}

fn injected(what: &str) -> StoreError {
    StoreError::Database(format!("injected failure: {}", what))
}

#[async_trait]
impl ItineraryTx for MemoryItineraryTx {
    async fn create_itinerary(&mut self, fields: &NewItinerary) -> Result<Itinerary, StoreError> {
        if self.faults.fail_itinerary {
            return Err(injected("itinerary insert"));
        }
        validate_new_itinerary(fields)?;
        if !self.directory.attendee_exists(fields.attendee_id).await {
            return Err(StoreError::Constraint(format!(
                "attendee {} does not exist",
                fields.attendee_id
            )));
        }

        let tables = self.tables.lock().await;
        let duplicate = tables
            .itineraries
            .iter()
            .chain(self.staged.itineraries.iter())
            .any(|i| i.provider_order_id.as_deref() == Some(fields.provider_order_id.as_str()));
        drop(tables);
        if duplicate {
            return Err(StoreError::Constraint(format!(
                "provider order {} already recorded",
                fields.provider_order_id
            )));
        }

        let itinerary = fields.clone().into_itinerary(Uuid::new_v4());
        self.staged.itineraries.push(itinerary.clone());
        Ok(itinerary)
    }

    async fn create_slice(
        &mut self,
        itinerary_id: Uuid,
        fields: &NewSlice,
    ) -> Result<ItinerarySlice, StoreError> {
        if self.faults.fail_slice == Some(self.staged.slices.len()) {
            return Err(injected("slice insert"));
        }
        if !self.staged.itineraries.iter().any(|i| i.id == itinerary_id) {
            return Err(StoreError::Constraint(format!("itinerary {} does not exist", itinerary_id)));
        }

        let slice = ItinerarySlice {
            id: Uuid::new_v4(),
            itinerary_id,
            position: fields.position,
            origin: fields.origin.clone(),
            destination: fields.destination.clone(),
            duration_minutes: fields.duration_minutes,
        };
        self.staged.slices.push(slice.clone());
        Ok(slice)
    }

    async fn create_segment(&mut self, slice_id: Uuid, fields: &NewSegment) -> Result<Segment, StoreError> {
        if self.faults.fail_segment == Some(self.staged.segments.len()) {
            return Err(injected("segment insert"));
        }
        if !self.staged.slices.iter().any(|s| s.id == slice_id) {
            return Err(StoreError::Constraint(format!("slice {} does not exist", slice_id)));
        }

        let segment = Segment {
            id: Uuid::new_v4(),
            slice_id,
            position: fields.position,
            origin: fields.origin.clone(),
            destination: fields.destination.clone(),
            departing_at: fields.departing_at.clone(),
            arriving_at: fields.arriving_at.clone(),
            duration_minutes: fields.duration_minutes,
        };
        self.staged.segments.push(segment.clone());
        Ok(segment)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.faults.fail_commit {
            return Err(injected("commit"));
        }

        let MemoryItineraryTx { tables, staged, .. } = *self;
        let mut tables = tables.lock().await;
        tables.itineraries.extend(staged.itineraries);
        tables.slices.extend(staged.slices);
        tables.segments.extend(staged.segments);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl ItineraryStore for MemoryItineraryStore {
    async fn begin(&self) -> Result<Box<dyn ItineraryTx>, StoreError> {
        Ok(Box::new(MemoryItineraryTx {
            tables: self.tables.clone(),
            directory: self.directory.clone(),
            faults: self.faults.lock().await.clone(),
            staged: ItineraryTables::default(),
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Itinerary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.itineraries.iter().find(|i| i.id == id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Itinerary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .itineraries
            .iter()
            .find(|i| i.provider_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn load_detail(&self, id: Uuid) -> Result<Option<ItineraryDetail>, StoreError> {
        let tables = self.tables.lock().await;
        let Some(itinerary) = tables.itineraries.iter().find(|i| i.id == id).cloned() else {
            return Ok(None);
        };

        let mut slices: Vec<SliceDetail> = tables
            .slices
            .iter()
            .filter(|s| s.itinerary_id == id)
            .map(|slice| {
                let mut segments: Vec<Segment> = tables
                    .segments
                    .iter()
                    .filter(|seg| seg.slice_id == slice.id)
                    .cloned()
                    .collect();
                segments.sort_by_key(|seg| seg.position);
                SliceDetail {
                    slice: slice.clone(),
                    segments,
                }
            })
            .collect();
        slices.sort_by_key(|s| s.slice.position);

        Ok(Some(ItineraryDetail { itinerary, slices }))
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Itinerary>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Itinerary> = tables
            .itineraries
            .iter()
            .filter(|i| i.event_id == event_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.held_at);
        Ok(rows)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Itinerary>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .itineraries
            .iter()
            .filter(|i| i.approval_status == ApprovalStatus::Pending && i.is_hold_expired(now))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<Itinerary, StoreError> {
        if self.faults.lock().await.fail_status_update {
            return Err(injected("status update"));
        }

        let mut tables = self.tables.lock().await;
        let row = tables
            .itineraries
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("itinerary {}", id)))?;

        row.apply(transition, at).map_err(|e| match e {
            TransitionError::Illegal { from, to } => StoreError::InvalidTransition { from, to },
            other => StoreError::Corrupt(other.to_string()),
        })?;
        Ok(row.clone())
    }
}

/// Revoked token IDs with their expiry instants.
#[derive(Default)]
pub struct MemoryDenylist {
    revoked: Mutex<HashMap<String, Instant>>,
}

impl MemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenDenylist for MemoryDenylist {
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> Result<(), SessionStoreError> {
        let mut revoked = self.revoked.lock().await;
        let now = Instant::now();
        revoked.retain(|_, until| *until > now);
        revoked.insert(jti.to_string(), now + Duration::from_secs(ttl_seconds.max(1)));
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError> {
        let revoked = self.revoked.lock().await;
        Ok(matches!(revoked.get(jti), Some(until) if *until > Instant::now()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|e| e.topic.clone()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        self.events.lock().await.push(PublishedEvent {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use junket_core::itinerary::{Airport, DenialReason};

    fn airport(code: &str) -> Airport {
        Airport {
            name: format!("{} Airport", code),
            city: None,
            iata_code: code.to_string(),
        }
    }

    fn new_itinerary(attendee: &Attendee, order_id: &str) -> NewItinerary {
        NewItinerary {
            attendee_id: attendee.id,
            event_id: attendee.event_id,
            provider_order_id: order_id.to_string(),
            provider_passenger_id: Some("pas_1".to_string()),
            provider_offer_id: "off_1".to_string(),
            booking_reference: None,
            total_cost: Decimal::new(25000, 2),
            base_cost: Decimal::new(20000, 2),
            tax_cost: Decimal::new(5000, 2),
            currency: "USD".to_string(),
            budget_on_book: Decimal::new(400, 0),
            threshold_on_book: Decimal::new(50, 0),
            group_name: "Speakers".to_string(),
            held_at: Utc::now(),
            expires_at: None,
        }
    }

    fn new_slice(position: i32) -> NewSlice {
        NewSlice {
            position,
            origin: airport("JFK"),
            destination: airport("LAX"),
            duration_minutes: Some(150),
        }
    }

    fn new_segment(position: i32) -> NewSegment {
        NewSegment {
            position,
            origin: airport("JFK"),
            destination: airport("LAX"),
            departing_at: "2026-11-02T08:00:00".to_string(),
            arriving_at: "2026-11-02T10:30:00".to_string(),
            duration_minutes: Some(150),
        }
    }

    async fn fixture() -> (MemoryItineraryStore, Attendee) {
        let directory = Arc::new(MemoryDirectory::new());
        let event = directory.add_event("RustConf", Decimal::new(50, 0)).await;
        let attendee = directory.add_attendee(Uuid::new_v4(), event.id, None).await;
        (MemoryItineraryStore::new(directory), attendee)
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let (store, attendee) = fixture().await;
        let mut tx = store.begin().await.unwrap();
        let itinerary = tx.create_itinerary(&new_itinerary(&attendee, "ord_1")).await.unwrap();
        let slice = tx.create_slice(itinerary.id, &new_slice(0)).await.unwrap();
        tx.create_segment(slice.id, &new_segment(0)).await.unwrap();

        assert_eq!(store.row_counts().await, (0, 0, 0));
        tx.commit().await.unwrap();
        assert_eq!(store.row_counts().await, (1, 1, 1));

        let detail = store.load_detail(itinerary.id).await.unwrap().unwrap();
        assert_eq!(detail.segment_count(), 1);
        assert_eq!(detail.itinerary.approval_status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn test_rollback_discards_everything() {
        let (store, attendee) = fixture().await;
        let mut tx = store.begin().await.unwrap();
        let itinerary = tx.create_itinerary(&new_itinerary(&attendee, "ord_1")).await.unwrap();
        tx.create_slice(itinerary.id, &new_slice(0)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.row_counts().await, (0, 0, 0));
        assert!(store.find_by_order_id("ord_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_attendee_is_a_constraint_error() {
        let (store, mut attendee) = fixture().await;
        attendee.id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let err = tx.create_itinerary(&new_itinerary(&attendee, "ord_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_slice_needs_parent_in_same_transaction() {
        let (store, _) = fixture().await;
        let mut tx = store.begin().await.unwrap();
        let err = tx.create_slice(Uuid::new_v4(), &new_slice(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_injected_segment_failure() {
        let (store, attendee) = fixture().await;
        store
            .inject(FaultPlan {
                fail_segment: Some(1),
                ..FaultPlan::default()
            })
            .await;

        let mut tx = store.begin().await.unwrap();
        let itinerary = tx.create_itinerary(&new_itinerary(&attendee, "ord_1")).await.unwrap();
        let slice = tx.create_slice(itinerary.id, &new_slice(0)).await.unwrap();
        tx.create_segment(slice.id, &new_segment(0)).await.unwrap();
        assert!(tx.create_segment(slice.id, &new_segment(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_status_is_compare_and_set() {
        let (store, attendee) = fixture().await;
        let mut tx = store.begin().await.unwrap();
        let itinerary = tx.create_itinerary(&new_itinerary(&attendee, "ord_1")).await.unwrap();
        tx.commit().await.unwrap();

        let declined = store
            .update_status(itinerary.id, Transition::Decline, Utc::now())
            .await
            .unwrap();
        assert_eq!(declined.denial_reason, Some(DenialReason::Declined));

        let err = store
            .update_status(itinerary.id, Transition::Approve, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ApprovalStatus::Denied,
                to: ApprovalStatus::Approved
            }
        ));

        let missing = store
            .update_status(Uuid::new_v4(), Transition::Approve, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_denylist_expires_entries() {
        let denylist = MemoryDenylist::new();
        denylist.revoke("jti-1", 60).await.unwrap();
        assert!(denylist.is_revoked("jti-1").await.unwrap());
        assert!(!denylist.is_revoked("jti-2").await.unwrap());
    }
}
