use chrono::{DateTime, Utc};
use junket_core::budget::{BudgetPolicy, BudgetStanding};
use junket_core::directory::Event;
use junket_core::itinerary::{ApprovalStatus, DenialReason, Itinerary};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::BookingError;
use crate::orchestrator::BookingOrchestrator;

/// One itinerary measured against the budget captured when it was held.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FinanceLine {
    pub itinerary_id: Uuid,
    pub attendee_id: Uuid,
    pub group_name: String,
    pub approval_status: ApprovalStatus,
    pub denial_reason: Option<DenialReason>,
    pub total_cost: Decimal,
    pub currency: String,
    pub budget_on_book: Decimal,
    pub threshold_on_book: Decimal,
    pub standing: BudgetStanding,
    pub overage: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FinanceTotals {
    pub approved_spend: Decimal,
    pub pending_exposure: Decimal,
    /// Live (pending or approved) itineraries above their budget.
    pub over_budget_count: usize,
    /// Live itineraries above budget plus threshold.
    pub over_threshold_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinanceReport {
    pub event_id: Uuid,
    pub event_name: String,
    pub generated_at: DateTime<Utc>,
    pub lines: Vec<FinanceLine>,
    pub totals: FinanceTotals,
}

impl FinanceReport {
    pub fn build(event: &Event, itineraries: &[Itinerary]) -> Self {
        let mut totals = FinanceTotals::default();
        let mut lines = Vec::with_capacity(itineraries.len());

        for itinerary in itineraries {
            let standing = BudgetPolicy::standing(
                itinerary.total_cost,
                itinerary.budget_on_book,
                itinerary.threshold_on_book,
            );

            match itinerary.approval_status {
                ApprovalStatus::Approved => totals.approved_spend += itinerary.total_cost,
                ApprovalStatus::Pending => totals.pending_exposure += itinerary.total_cost,
                ApprovalStatus::Denied => {}
            }

            if itinerary.approval_status != ApprovalStatus::Denied {
                match standing {
                    BudgetStanding::WithinBudget => {}
                    BudgetStanding::OverBudget => totals.over_budget_count += 1,
                    BudgetStanding::OverThreshold => {
                        totals.over_budget_count += 1;
                        totals.over_threshold_count += 1;
                    }
                }
            }

            lines.push(FinanceLine {
                itinerary_id: itinerary.id,
                attendee_id: itinerary.attendee_id,
                group_name: itinerary.group_name.clone(),
                approval_status: itinerary.approval_status,
                denial_reason: itinerary.denial_reason,
                total_cost: itinerary.total_cost,
                currency: itinerary.currency.clone(),
                budget_on_book: itinerary.budget_on_book,
                threshold_on_book: itinerary.threshold_on_book,
                standing,
                overage: BudgetPolicy::overage(itinerary.total_cost, itinerary.budget_on_book),
            });
        }

        FinanceReport {
            event_id: event.id,
            event_name: event.name.clone(),
            generated_at: Utc::now(),
            lines,
            totals,
        }
    }
}

impl BookingOrchestrator {
    pub async fn finance_report(&self, event_id: Uuid) -> Result<FinanceReport, BookingError> {
        let event = self
            .directory()
            .find_event(event_id)
            .await?
            .ok_or(BookingError::EventNotFound(event_id))?;
        let itineraries = self.itineraries().list_for_event(event_id).await?;

        Ok(FinanceReport::build(&event, &itineraries))
    }
}
