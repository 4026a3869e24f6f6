use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Approval status of an itinerary.
///
/// `Pending` is the only non-terminal value. `Approved` may still move to
/// `Denied` through a provider-confirmed cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Why an itinerary ended up `Denied`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DenialReason {
    /// A planner declined the pending hold.
    Declined,
    /// An approved booking was cancelled with the provider.
    Cancelled,
    /// The hold passed its payment deadline without being paid.
    Lapsed,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Declined => "declined",
            DenialReason::Cancelled => "cancelled",
            DenialReason::Lapsed => "lapsed",
        }
    }
}

impl FromStr for DenialReason {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declined" => Ok(DenialReason::Declined),
            "cancelled" => Ok(DenialReason::Cancelled),
            "lapsed" => Ok(DenialReason::Lapsed),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Which lifecycle timestamp a transition stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStamp {
    ApprovedAt,
    CancelledAt,
}

impl LifecycleStamp {
    pub fn column(&self) -> &'static str {
        match self {
            LifecycleStamp::ApprovedAt => "approved_at",
            LifecycleStamp::CancelledAt => "cancelled_at",
        }
    }
}

/// The legal edges of the approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// pending -> approved, after the provider took payment
    Approve,
    /// pending -> denied, planner decision, no provider call
    Decline,
    /// approved -> denied, after provider cancellation confirmed
    Cancel,
    /// pending -> denied, hold expired on the provider side
    Lapse,
}

impl Transition {
    pub fn from_status(&self) -> ApprovalStatus {
        match self {
            Transition::Approve | Transition::Decline | Transition::Lapse => ApprovalStatus::Pending,
            Transition::Cancel => ApprovalStatus::Approved,
        }
    }

    pub fn to_status(&self) -> ApprovalStatus {
        match self {
            Transition::Approve => ApprovalStatus::Approved,
            Transition::Decline | Transition::Cancel | Transition::Lapse => ApprovalStatus::Denied,
        }
    }

    pub fn stamp(&self) -> LifecycleStamp {
        match self {
            Transition::Approve => LifecycleStamp::ApprovedAt,
            _ => LifecycleStamp::CancelledAt,
        }
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Transition::Approve => None,
            Transition::Decline => Some(DenialReason::Declined),
            Transition::Cancel => Some(DenialReason::Cancelled),
            Transition::Lapse => Some(DenialReason::Lapsed),
        }
    }

    /// Checks the edge against the current status without applying it.
    pub fn check(&self, current: ApprovalStatus) -> Result<(), TransitionError> {
        if current != self.from_status() {
            return Err(TransitionError::Illegal {
                from: current,
                to: self.to_status(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid state transition from {from} to {to}")]
    Illegal {
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    #[error("Unknown itinerary status: {0}")]
    UnknownStatus(String),
}

/// One end of a slice or segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Airport {
    pub name: String,
    pub city: Option<String>,
    pub iata_code: String,
}

/// One booking attempt for one attendee at one event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub id: Uuid,
    pub attendee_id: Uuid,
    pub event_id: Uuid,
    pub provider_order_id: Option<String>,
    pub provider_passenger_id: Option<String>,
    pub provider_offer_id: Option<String>,
    pub booking_reference: Option<String>,
    pub total_cost: Decimal,
    pub base_cost: Decimal,
    pub tax_cost: Decimal,
    pub currency: String,
    pub budget_on_book: Decimal,
    pub threshold_on_book: Decimal,
    pub group_name: String,
    pub approval_status: ApprovalStatus,
    pub denial_reason: Option<DenialReason>,
    pub held_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Itinerary {
    /// Applies `transition` in place, stamping the matching timestamp.
    pub fn apply(&mut self, transition: Transition, at: DateTime<Utc>) -> Result<(), TransitionError> {
        transition.check(self.approval_status)?;

        self.approval_status = transition.to_status();
        self.denial_reason = transition.denial_reason();
        match transition.stamp() {
            LifecycleStamp::ApprovedAt => self.approved_at = Some(at),
            LifecycleStamp::CancelledAt => self.cancelled_at = Some(at),
        }
        Ok(())
    }

    pub fn is_hold_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Fields for a new itinerary row. Everything here is required; the store
/// refuses blank provider identifiers.
#[derive(Debug, Clone)]
pub struct NewItinerary {
    pub attendee_id: Uuid,
    pub event_id: Uuid,
    pub provider_order_id: String,
    pub provider_passenger_id: Option<String>,
    pub provider_offer_id: String,
    pub booking_reference: Option<String>,
    pub total_cost: Decimal,
    pub base_cost: Decimal,
    pub tax_cost: Decimal,
    pub currency: String,
    pub budget_on_book: Decimal,
    pub threshold_on_book: Decimal,
    pub group_name: String,
    pub held_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewItinerary {
    pub fn into_itinerary(self, id: Uuid) -> Itinerary {
        Itinerary {
            id,
            attendee_id: self.attendee_id,
            event_id: self.event_id,
            provider_order_id: Some(self.provider_order_id),
            provider_passenger_id: self.provider_passenger_id,
            provider_offer_id: Some(self.provider_offer_id),
            booking_reference: self.booking_reference,
            total_cost: self.total_cost,
            base_cost: self.base_cost,
            tax_cost: self.tax_cost,
            currency: self.currency,
            budget_on_book: self.budget_on_book,
            threshold_on_book: self.threshold_on_book,
            group_name: self.group_name,
            approval_status: ApprovalStatus::Pending,
            denial_reason: None,
            held_at: self.held_at,
            expires_at: self.expires_at,
            approved_at: None,
            cancelled_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItinerarySlice {
    pub id: Uuid,
    pub itinerary_id: Uuid,
    pub position: i32,
    pub origin: Airport,
    pub destination: Airport,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewSlice {
    pub position: i32,
    pub origin: Airport,
    pub destination: Airport,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: Uuid,
    pub slice_id: Uuid,
    pub position: i32,
    pub origin: Airport,
    pub destination: Airport,
    pub departing_at: String,
    pub arriving_at: String,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewSegment {
    pub position: i32,
    pub origin: Airport,
    pub destination: Airport,
    pub departing_at: String,
    pub arriving_at: String,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SliceDetail {
    #[serde(flatten)]
    pub slice: ItinerarySlice,
    pub segments: Vec<Segment>,
}

/// An itinerary with its ordered slices and segments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItineraryDetail {
    #[serde(flatten)]
    pub itinerary: Itinerary,
    pub slices: Vec<SliceDetail>,
}

impl ItineraryDetail {
    pub fn segment_count(&self) -> usize {
        self.slices.iter().map(|s| s.segments.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_itinerary() -> Itinerary {
        NewItinerary {
            attendee_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            provider_order_id: "ord_1".to_string(),
            provider_passenger_id: Some("pas_1".to_string()),
            provider_offer_id: "off_1".to_string(),
            booking_reference: Some("RZPNX8".to_string()),
            total_cost: Decimal::new(25000, 2),
            base_cost: Decimal::new(20000, 2),
            tax_cost: Decimal::new(5000, 2),
            currency: "USD".to_string(),
            budget_on_book: Decimal::new(500, 0),
            threshold_on_book: Decimal::new(100, 0),
            group_name: "Speakers".to_string(),
            held_at: Utc::now(),
            expires_at: None,
        }
        .into_itinerary(Uuid::new_v4())
    }

    #[test]
    fn test_approval_lifecycle() {
        let mut itinerary = pending_itinerary();
        let now = Utc::now();

        itinerary.apply(Transition::Approve, now).unwrap();
        assert_eq!(itinerary.approval_status, ApprovalStatus::Approved);
        assert_eq!(itinerary.approved_at, Some(now));
        assert_eq!(itinerary.denial_reason, None);

        itinerary.apply(Transition::Cancel, now).unwrap();
        assert_eq!(itinerary.approval_status, ApprovalStatus::Denied);
        assert_eq!(itinerary.denial_reason, Some(DenialReason::Cancelled));
        assert_eq!(itinerary.cancelled_at, Some(now));
    }

    #[test]
    fn test_decline_only_from_pending() {
        let mut itinerary = pending_itinerary();
        itinerary.apply(Transition::Approve, Utc::now()).unwrap();

        let err = itinerary.apply(Transition::Decline, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: ApprovalStatus::Approved,
                to: ApprovalStatus::Denied,
            }
        );
        assert_eq!(itinerary.approval_status, ApprovalStatus::Approved);
        assert!(itinerary.cancelled_at.is_none());
    }

    #[test]
    fn test_cancel_rejected_from_pending_and_denied() {
        let mut itinerary = pending_itinerary();
        assert!(itinerary.apply(Transition::Cancel, Utc::now()).is_err());
        assert_eq!(itinerary.approval_status, ApprovalStatus::Pending);

        itinerary.apply(Transition::Decline, Utc::now()).unwrap();
        assert!(itinerary.apply(Transition::Cancel, Utc::now()).is_err());
        assert!(itinerary.apply(Transition::Approve, Utc::now()).is_err());
        assert_eq!(itinerary.denial_reason, Some(DenialReason::Declined));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [ApprovalStatus::Pending, ApprovalStatus::Approved, ApprovalStatus::Denied] {
            assert_eq!(status.as_str().parse::<ApprovalStatus>().unwrap(), status);
        }
        assert!("paid".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn test_hold_expiry() {
        let mut itinerary = pending_itinerary();
        let now = Utc::now();
        assert!(!itinerary.is_hold_expired(now));

        itinerary.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(itinerary.is_hold_expired(now));
    }
}
