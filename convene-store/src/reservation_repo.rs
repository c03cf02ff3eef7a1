use async_trait::async_trait;
use convene_core::{Event, ReservationStore, ReservationTx, Rsvp, StoreError};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::database::store_error;
use crate::event_repo::{EventRow, RsvpRow, EVENT_COLUMNS, RSVP_COLUMNS};

/// Reservation transactions on PostgreSQL.
///
/// Runs at READ COMMITTED: the seat counter is only ever changed through
/// conditional `UPDATE ... WHERE current_attendees < capacity`, which takes
/// the row lock and re-evaluates the predicate against the latest committed
/// row, so concurrent claims on one event serialise on that row.
pub struct PostgresReservationStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresReservationStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self { pool, statement_timeout }
    }
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn begin(&self) -> Result<Box<dyn ReservationTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // SET LOCAL takes no bind parameters; the value is an integer we own.
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        Ok(Box::new(PostgresReservationTx { tx: Some(tx) }))
    }
}

/// Dropping an unfinished handle hands the connection back to the pool,
/// which rolls the transaction back.
pub struct PostgresReservationTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresReservationTx {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))
    }

    async fn fetch_event(&mut self, sql: &str, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(sql)
            .bind(event_id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;

        Ok(row.map(Event::from))
    }
}

#[async_trait]
impl ReservationTx for PostgresReservationTx {
    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        self.fetch_event(&sql, event_id).await
    }

    async fn find_rsvp(&mut self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let sql = format!("SELECT {} FROM rsvps WHERE event_id = $1 AND user_id = $2", RSVP_COLUMNS);
        let row = sqlx::query_as::<_, RsvpRow>(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;

        row.map(Rsvp::try_from).transpose()
    }

    async fn claim_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let sql = format!(
            r#"
            UPDATE events
            SET current_attendees = current_attendees + 1, updated_at = NOW()
            WHERE id = $1 AND current_attendees < capacity
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        let event = self.fetch_event(&sql, event_id).await?;
        if event.is_none() {
            debug!(%event_id, "Conditional seat claim matched no row");
        }
        Ok(event)
    }

    async fn insert_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rsvps (id, event_id, user_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(rsvp.id)
        .bind(rsvp.event_id)
        .bind(&rsvp.user_id)
        .bind(rsvp.status.as_str())
        .bind(rsvp.created_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn delete_rsvp(&mut self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let sql = format!(
            "DELETE FROM rsvps WHERE event_id = $1 AND user_id = $2 RETURNING {}",
            RSVP_COLUMNS
        );
        let row = sqlx::query_as::<_, RsvpRow>(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;

        row.map(Rsvp::try_from).transpose()
    }

    async fn release_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let sql = format!(
            r#"
            UPDATE events
            SET current_attendees = GREATEST(current_attendees - 1, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        self.fetch_event(&sql, event_id).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))?;
        tx.commit().await.map_err(store_error)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(store_error),
            None => Ok(()),
        }
    }
}
