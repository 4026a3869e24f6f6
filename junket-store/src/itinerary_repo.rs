use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use junket_core::itinerary::{
    Airport, Itinerary, ItineraryDetail, ItinerarySlice, NewItinerary, NewSegment, NewSlice, Segment,
    SliceDetail, Transition,
};
use junket_core::repository::{validate_new_itinerary, ItineraryStore, ItineraryTx, StoreError};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

const ITINERARY_COLUMNS: &str = "id, attendee_id, event_id, provider_order_id, provider_passenger_id, \
     provider_offer_id, booking_reference, total_cost, base_cost, tax_cost, currency, budget_on_book, \
     threshold_on_book, group_name, approval_status, denial_reason, held_at, expires_at, approved_at, \
     cancelled_at";

const SLICE_COLUMNS: &str = "id, itinerary_id, position, origin_name, origin_city, origin_iata, \
     destination_name, destination_city, destination_iata, duration_minutes";

const SEGMENT_COLUMNS: &str = "id, slice_id, position, origin_name, origin_city, origin_iata, \
     destination_name, destination_city, destination_iata, departing_at, arriving_at, duration_minutes";

pub(crate) fn map_db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation
            | ErrorKind::UniqueViolation => StoreError::Constraint(db.message().to_string()),
            _ => StoreError::Database(e.to_string()),
        },
        _ => StoreError::Database(e.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct ItineraryRow {
    id: Uuid,
    attendee_id: Uuid,
    event_id: Uuid,
    provider_order_id: Option<String>,
    provider_passenger_id: Option<String>,
    provider_offer_id: Option<String>,
    booking_reference: Option<String>,
    total_cost: Decimal,
    base_cost: Decimal,
    tax_cost: Decimal,
    currency: String,
    budget_on_book: Decimal,
    threshold_on_book: Decimal,
    group_name: String,
    approval_status: String,
    denial_reason: Option<String>,
    held_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<ItineraryRow> for Itinerary {
    type Error = StoreError;

    fn try_from(row: ItineraryRow) -> Result<Self, Self::Error> {
        let approval_status = row
            .approval_status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("itinerary {}: {}", row.id, e)))?;
        let denial_reason = row
            .denial_reason
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("itinerary {}: {}", row.id, e)))?;

        Ok(Itinerary {
            id: row.id,
            attendee_id: row.attendee_id,
            event_id: row.event_id,
            provider_order_id: row.provider_order_id,
            provider_passenger_id: row.provider_passenger_id,
            provider_offer_id: row.provider_offer_id,
            booking_reference: row.booking_reference,
            total_cost: row.total_cost,
            base_cost: row.base_cost,
            tax_cost: row.tax_cost,
            currency: row.currency,
            budget_on_book: row.budget_on_book,
            threshold_on_book: row.threshold_on_book,
            group_name: row.group_name,
            approval_status,
            denial_reason,
            held_at: row.held_at,
            expires_at: row.expires_at,
            approved_at: row.approved_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SliceRow {
    id: Uuid,
    itinerary_id: Uuid,
    position: i32,
    origin_name: String,
    origin_city: Option<String>,
    origin_iata: String,
    destination_name: String,
    destination_city: Option<String>,
    destination_iata: String,
    duration_minutes: Option<i32>,
}

impl From<SliceRow> for ItinerarySlice {
    fn from(row: SliceRow) -> Self {
        ItinerarySlice {
            id: row.id,
            itinerary_id: row.itinerary_id,
            position: row.position,
            origin: Airport {
                name: row.origin_name,
                city: row.origin_city,
                iata_code: row.origin_iata,
            },
            destination: Airport {
                name: row.destination_name,
                city: row.destination_city,
                iata_code: row.destination_iata,
            },
            duration_minutes: row.duration_minutes,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    id: Uuid,
    slice_id: Uuid,
    position: i32,
    origin_name: String,
    origin_city: Option<String>,
    origin_iata: String,
    destination_name: String,
    destination_city: Option<String>,
    destination_iata: String,
    departing_at: String,
    arriving_at: String,
    duration_minutes: Option<i32>,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Segment {
            id: row.id,
            slice_id: row.slice_id,
            position: row.position,
            origin: Airport {
                name: row.origin_name,
                city: row.origin_city,
                iata_code: row.origin_iata,
            },
            destination: Airport {
                name: row.destination_name,
                city: row.destination_city,
                iata_code: row.destination_iata,
            },
            departing_at: row.departing_at,
            arriving_at: row.arriving_at,
            duration_minutes: row.duration_minutes,
        }
    }
}

pub struct PgItineraryTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ItineraryTx for PgItineraryTx {
    async fn create_itinerary(&mut self, fields: &NewItinerary) -> Result<Itinerary, StoreError> {
        validate_new_itinerary(fields)?;

        let sql = format!(
            r#"
            INSERT INTO itineraries (id, attendee_id, event_id, provider_order_id, provider_passenger_id,
                provider_offer_id, booking_reference, total_cost, base_cost, tax_cost, currency,
                budget_on_book, threshold_on_book, group_name, approval_status, held_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'pending', $15, $16)
            RETURNING {}
            "#,
            ITINERARY_COLUMNS
        );

        let row = sqlx::query_as::<_, ItineraryRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(fields.attendee_id)
            .bind(fields.event_id)
            .bind(&fields.provider_order_id)
            .bind(&fields.provider_passenger_id)
            .bind(&fields.provider_offer_id)
            .bind(&fields.booking_reference)
            .bind(fields.total_cost)
            .bind(fields.base_cost)
            .bind(fields.tax_cost)
            .bind(&fields.currency)
            .bind(fields.budget_on_book)
            .bind(fields.threshold_on_book)
            .bind(&fields.group_name)
            .bind(fields.held_at)
            .bind(fields.expires_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        row.try_into()
    }

    async fn create_slice(
        &mut self,
        itinerary_id: Uuid,
        fields: &NewSlice,
    ) -> Result<ItinerarySlice, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO itinerary_slices (id, itinerary_id, position, origin_name, origin_city, origin_iata,
                destination_name, destination_city, destination_iata, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            SLICE_COLUMNS
        );

        let row = sqlx::query_as::<_, SliceRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(itinerary_id)
            .bind(fields.position)
            .bind(&fields.origin.name)
            .bind(&fields.origin.city)
            .bind(&fields.origin.iata_code)
            .bind(&fields.destination.name)
            .bind(&fields.destination.city)
            .bind(&fields.destination.iata_code)
            .bind(fields.duration_minutes)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn create_segment(&mut self, slice_id: Uuid, fields: &NewSegment) -> Result<Segment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO itinerary_segments (id, slice_id, position, origin_name, origin_city, origin_iata,
                destination_name, destination_city, destination_iata, departing_at, arriving_at,
                duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            SEGMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, SegmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(slice_id)
            .bind(fields.position)
            .bind(&fields.origin.name)
            .bind(&fields.origin.city)
            .bind(&fields.origin.iata_code)
            .bind(&fields.destination.name)
            .bind(&fields.destination.city)
            .bind(&fields.destination.iata_code)
            .bind(&fields.departing_at)
            .bind(&fields.arriving_at)
            .bind(fields.duration_minutes)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(map_db_error)
    }
}

pub struct PgItineraryStore {
    pool: PgPool,
}

impl PgItineraryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItineraryStore for PgItineraryStore {
    async fn begin(&self) -> Result<Box<dyn ItineraryTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgItineraryTx { tx }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Itinerary>, StoreError> {
        let row = sqlx::query_as::<_, ItineraryRow>(&format!(
            "SELECT {} FROM itineraries WHERE id = $1",
            ITINERARY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(Itinerary::try_from).transpose()
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Itinerary>, StoreError> {
        let row = sqlx::query_as::<_, ItineraryRow>(&format!(
            "SELECT {} FROM itineraries WHERE provider_order_id = $1",
            ITINERARY_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(Itinerary::try_from).transpose()
    }

    async fn load_detail(&self, id: Uuid) -> Result<Option<ItineraryDetail>, StoreError> {
        let Some(itinerary) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let slices: Vec<ItinerarySlice> = sqlx::query_as::<_, SliceRow>(&format!(
            "SELECT {} FROM itinerary_slices WHERE itinerary_id = $1 ORDER BY position",
            SLICE_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(ItinerarySlice::from)
        .collect();

        let slice_ids: Vec<Uuid> = slices.iter().map(|s| s.id).collect();
        let segments = sqlx::query_as::<_, SegmentRow>(&format!(
            "SELECT {} FROM itinerary_segments WHERE slice_id = ANY($1) ORDER BY position",
            SEGMENT_COLUMNS
        ))
        .bind(&slice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut by_slice: HashMap<Uuid, Vec<Segment>> = HashMap::new();
        for row in segments {
            let segment = Segment::from(row);
            by_slice.entry(segment.slice_id).or_default().push(segment);
        }

        let slices = slices
            .into_iter()
            .map(|slice| {
                let segments = by_slice.remove(&slice.id).unwrap_or_default();
                SliceDetail { slice, segments }
            })
            .collect();

        Ok(Some(ItineraryDetail { itinerary, slices }))
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Itinerary>, StoreError> {
        let rows = sqlx::query_as::<_, ItineraryRow>(&format!(
            "SELECT {} FROM itineraries WHERE event_id = $1 ORDER BY held_at",
            ITINERARY_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Itinerary::try_from).collect()
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Itinerary>, StoreError> {
        let rows = sqlx::query_as::<_, ItineraryRow>(&format!(
            "SELECT {} FROM itineraries \
             WHERE approval_status = 'pending' AND expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at",
            ITINERARY_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Itinerary::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<Itinerary, StoreError> {
        let sql = format!(
            "UPDATE itineraries SET approval_status = $1, denial_reason = $2, {} = $3 \
             WHERE id = $4 AND approval_status = $5 \
             RETURNING {}",
            transition.stamp().column(),
            ITINERARY_COLUMNS
        );

        let updated = sqlx::query_as::<_, ItineraryRow>(&sql)
            .bind(transition.to_status().as_str())
            .bind(transition.denial_reason().map(|r| r.as_str()))
            .bind(at)
            .bind(id)
            .bind(transition.from_status().as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        if let Some(row) = updated {
            debug!(itinerary_id = %id, status = %transition.to_status(), "Itinerary status updated");
            return row.try_into();
        }

        // Nothing matched: either the row is gone or another writer moved it.
        match self.find_by_id(id).await? {
            None => Err(StoreError::NotFound(format!("itinerary {}", id))),
            Some(current) => Err(StoreError::InvalidTransition {
                from: current.approval_status,
                to: transition.to_status(),
            }),
        }
    }
}
