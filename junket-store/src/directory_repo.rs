use async_trait::async_trait;
use junket_core::directory::{Attendee, Event, EventGroup, RoleSet};
use junket_core::repository::{DirectoryRepository, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::itinerary_repo::map_db_error;

pub struct PgDirectoryRepository {
    pool: PgPool,
}

impl PgDirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    flight_budget_threshold: Decimal,
}

#[derive(sqlx::FromRow)]
struct EventGroupRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    flight_budget: Decimal,
}

#[derive(sqlx::FromRow)]
struct AttendeeRow {
    id: Uuid,
    user_id: Uuid,
    event_id: Uuid,
    event_group_id: Option<Uuid>,
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    async fn find_attendee(&self, user_id: Uuid, event_id: Uuid) -> Result<Option<Attendee>, StoreError> {
        let row = sqlx::query_as::<_, AttendeeRow>(
            "SELECT id, user_id, event_id, event_group_id FROM attendees WHERE user_id = $1 AND event_id = $2",
        )
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(|r| Attendee {
            id: r.id,
            user_id: r.user_id,
            event_id: r.event_id,
            event_group_id: r.event_group_id,
        }))
    }

    async fn find_event_group(&self, group_id: Uuid) -> Result<Option<EventGroup>, StoreError> {
        let row = sqlx::query_as::<_, EventGroupRow>(
            "SELECT id, event_id, name, flight_budget FROM event_groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(|r| EventGroup {
            id: r.id,
            event_id: r.event_id,
            name: r.name,
            flight_budget: r.flight_budget,
        }))
    }

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, organization_id, name, flight_budget_threshold FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(|r| Event {
            id: r.id,
            organization_id: r.organization_id,
            name: r.name,
            flight_budget_threshold: r.flight_budget_threshold,
        }))
    }

    async fn event_roles(&self, user_id: Uuid, event_id: Uuid) -> Result<RoleSet, StoreError> {
        let roles: Option<i16> =
            sqlx::query_scalar("SELECT roles FROM event_memberships WHERE user_id = $1 AND event_id = $2")
                .bind(user_id)
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;

        Ok(roles
            .map(|bits| RoleSet::from_bits_truncate(bits as u8))
            .unwrap_or_default())
    }
}
