use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::directory::{Event, EventGroup};

/// Budget values copied onto an itinerary at hold time. They are audit
/// values; later edits to the group or event never touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub flight_budget: Decimal,
    pub threshold: Decimal,
    pub group_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetStanding {
    WithinBudget,
    OverBudget,
    OverThreshold,
}

pub struct BudgetPolicy;

impl BudgetPolicy {
    pub fn snapshot(group: &EventGroup, event: &Event) -> BudgetSnapshot {
        BudgetSnapshot {
            flight_budget: group.flight_budget,
            threshold: event.flight_budget_threshold,
            group_name: group.name.clone(),
        }
    }

    /// The threshold is the overage tolerated above the budget before a
    /// booking is flagged for finance.
    pub fn standing(total: Decimal, budget: Decimal, threshold: Decimal) -> BudgetStanding {
        if total <= budget {
            BudgetStanding::WithinBudget
        } else if total <= budget + threshold {
            BudgetStanding::OverBudget
        } else {
            BudgetStanding::OverThreshold
        }
    }

    pub fn overage(total: Decimal, budget: Decimal) -> Decimal {
        if total > budget {
            total - budget
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    #[test]
    fn test_snapshot_copies_group_and_event_values() {
        let event = Event {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "RustConf".to_string(),
            flight_budget_threshold: dec(75),
        };
        let mut group = EventGroup {
            id: Uuid::new_v4(),
            event_id: event.id,
            name: "Speakers".to_string(),
            flight_budget: dec(400),
        };

        let snapshot = BudgetPolicy::snapshot(&group, &event);
        group.flight_budget = dec(900);

        assert_eq!(snapshot.flight_budget, dec(400));
        assert_eq!(snapshot.threshold, dec(75));
        assert_eq!(snapshot.group_name, "Speakers");
    }

    #[test]
    fn test_standing_boundaries() {
        assert_eq!(BudgetPolicy::standing(dec(400), dec(400), dec(50)), BudgetStanding::WithinBudget);
        assert_eq!(BudgetPolicy::standing(dec(401), dec(400), dec(50)), BudgetStanding::OverBudget);
        assert_eq!(BudgetPolicy::standing(dec(450), dec(400), dec(50)), BudgetStanding::OverBudget);
        assert_eq!(BudgetPolicy::standing(dec(451), dec(400), dec(50)), BudgetStanding::OverThreshold);
    }

    #[test]
    fn test_overage() {
        assert_eq!(BudgetPolicy::overage(dec(300), dec(400)), Decimal::ZERO);
        assert_eq!(BudgetPolicy::overage(dec(480), dec(400)), dec(80));
    }
}
