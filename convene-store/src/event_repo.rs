use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convene_core::{Event, EventRepository, EventUpdate, Rsvp, RsvpStatus, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::store_error;

pub(crate) const EVENT_COLUMNS: &str =
    "id, title, description, location, date_time, capacity, current_attendees, created_by, created_at, updated_at";

pub(crate) const RSVP_COLUMNS: &str = "id, event_id, user_id, status, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    title: String,
    description: String,
    location: String,
    date_time: DateTime<Utc>,
    capacity: i32,
    current_attendees: i32,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            location: row.location,
            date_time: row.date_time,
            capacity: row.capacity,
            current_attendees: row.current_attendees,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RsvpRow {
    id: Uuid,
    event_id: Uuid,
    user_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RsvpRow> for Rsvp {
    type Error = StoreError;

    fn try_from(row: RsvpRow) -> Result<Self, Self::Error> {
        let status: RsvpStatus = row
            .status
            .parse()
            .map_err(|e: convene_core::rsvp::UnknownStatus| StoreError::Backend(e.to_string()))?;

        Ok(Rsvp {
            id: row.id,
            event_id: row.event_id,
            user_id: row.user_id,
            status,
            created_at: row.created_at,
        })
    }
}

pub(crate) fn rsvps_from_rows(rows: Vec<RsvpRow>) -> Result<Vec<Rsvp>, StoreError> {
    rows.into_iter().map(Rsvp::try_from).collect()
}

pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO events (id, title, description, location, date_time, capacity, current_attendees, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.date_time)
        .bind(event.capacity)
        .bind(event.current_attendees)
        .bind(&event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(Event::from))
    }

    async fn update_event(&self, id: Uuid, update: &EventUpdate) -> Result<Option<Event>, StoreError> {
        // Same guard as claim_seat, from the other side: capacity may only
        // move to a value that still holds every confirmed attendee.
        let sql = format!(
            r#"
            UPDATE events SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                date_time = COALESCE($5, date_time),
                capacity = COALESCE($6, capacity),
                updated_at = NOW()
            WHERE id = $1 AND COALESCE($6, capacity) >= current_attendees
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );

        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .bind(update.title.as_deref().map(str::trim))
            .bind(update.description.as_deref())
            .bind(update.location.as_deref().map(str::trim))
            .bind(update.date_time)
            .bind(update.capacity)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(Event::from))
    }

    async fn delete_event(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Lock the row first so an in-flight seat claim finishes before the
        // RSVPs are swept.
        let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        if locked.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM rsvps WHERE event_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    async fn list_events_by_owner(&self, owner: &str) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT {} FROM events WHERE created_by = $1 ORDER BY created_at DESC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn list_attending_events(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM events
            WHERE id IN (SELECT event_id FROM rsvps WHERE user_id = $1 AND status = 'attending')
            ORDER BY date_time ASC
            "#,
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn find_rsvp(&self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let sql = format!("SELECT {} FROM rsvps WHERE event_id = $1 AND user_id = $2", RSVP_COLUMNS);
        let row = sqlx::query_as::<_, RsvpRow>(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Rsvp::try_from).transpose()
    }

    async fn list_rsvps_for_user(&self, user_id: &str) -> Result<Vec<Rsvp>, StoreError> {
        let sql = format!(
            "SELECT {} FROM rsvps WHERE user_id = $1 ORDER BY created_at DESC",
            RSVP_COLUMNS
        );
        let rows = sqlx::query_as::<_, RsvpRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rsvps_from_rows(rows)
    }

    async fn list_attendees(&self, event_id: Uuid) -> Result<Vec<Rsvp>, StoreError> {
        let sql = format!(
            "SELECT {} FROM rsvps WHERE event_id = $1 AND status = 'attending' ORDER BY created_at ASC",
            RSVP_COLUMNS
        );
        let rows = sqlx::query_as::<_, RsvpRow>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rsvps_from_rows(rows)
    }
}
