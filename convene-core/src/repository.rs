use async_trait::async_trait;
use uuid::Uuid;

use crate::event::{Event, EventUpdate};
use crate::rsvp::Rsvp;
use crate::StoreError;

/// An open store transaction. The handle is passed explicitly through a
/// reservation so every read and write lands in the same unit of work.
///
/// Dropping a handle without calling [`commit`](ReservationTx::commit)
/// must discard everything it wrote.
#[async_trait]
pub trait ReservationTx: Send {
    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn find_rsvp(
        &mut self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Rsvp>, StoreError>;

    /// Increments `current_attendees` iff it is still below `capacity`, as
    /// one conditional write. Returns the updated event, or `None` when the
    /// predicate failed (or the event is gone).
    async fn claim_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] if the (event, user) pair
    /// already has an RSVP.
    async fn insert_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError>;

    /// Deletes and returns the RSVP, if one existed.
    async fn delete_rsvp(
        &mut self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Option<Rsvp>, StoreError>;

    /// Decrements `current_attendees`, floored at zero.
    async fn release_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ReservationTx>, StoreError>;
}

/// Non-transactional event and RSVP access used by the API layer.
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Applies the update only if its capacity still fits the current
    /// attendance; `None` means the event is missing or the guard failed.
    async fn update_event(
        &self,
        id: Uuid,
        update: &EventUpdate,
    ) -> Result<Option<Event>, StoreError>;

    /// Removes the event and every RSVP on it in one transaction.
    /// Returns `false` if there was no such event.
    async fn delete_event(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Events created by `owner`, newest first.
    async fn list_events_by_owner(&self, owner: &str) -> Result<Vec<Event>, StoreError>;

    /// Events `user_id` holds an attending RSVP for, soonest first.
    async fn list_attending_events(&self, user_id: &str) -> Result<Vec<Event>, StoreError>;

    async fn find_rsvp(&self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError>;

    /// Newest first.
    async fn list_rsvps_for_user(&self, user_id: &str) -> Result<Vec<Rsvp>, StoreError>;

    async fn list_attendees(&self, event_id: Uuid) -> Result<Vec<Rsvp>, StoreError>;
}
