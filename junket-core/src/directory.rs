use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub flight_budget_threshold: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventGroup {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub flight_budget: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendee {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub event_group_id: Option<Uuid>,
}

bitflags::bitflags! {
    /// Staff roles a user holds at one event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RoleSet: u8 {
        const EVENT_PLANNER = 0b0000_0001;
        const FINANCE = 0b0000_0010;
    }
}

impl RoleSet {
    /// Approve, decline and cancel bookings for the event.
    pub fn can_manage_travel(&self) -> bool {
        self.intersects(RoleSet::EVENT_PLANNER | RoleSet::FINANCE)
    }

    pub fn can_view_finance(&self) -> bool {
        self.contains(RoleSet::FINANCE)
    }
}
