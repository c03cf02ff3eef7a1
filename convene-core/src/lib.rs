//! Domain layer for the RSVP service: event and RSVP models, the store
//! traits the persistence crates implement, and the capacity-safe
//! [`ReservationManager`](reservation::ReservationManager).

use std::time::Duration;
use uuid::Uuid;

pub mod event;
pub mod memory;
pub mod repository;
pub mod reservation;
pub mod rsvp;

pub use event::{Event, EventUpdate, NewEvent, SeatSummary};
pub use memory::MemoryStore;
pub use repository::{EventRepository, ReservationStore, ReservationTx};
pub use reservation::{Reservation, ReservationManager, ReservationPolicy};
pub use rsvp::{Rsvp, RsvpStatus};

/// Failures reported by a store implementation. Backends translate their
/// native errors into these before anything leaves the store crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Store operation timed out: {0}")]
    Timeout(String),
    #[error("Store failure: {0}")]
    Backend(String),
}

/// Outcome taxonomy of `reserve_seat` / `release_seat`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("RSVP not found for event {event_id}")]
    RsvpNotFound { event_id: Uuid },

    #[error("You have already RSVP'd to this event")]
    DuplicateReservation,

    #[error("Event is at full capacity ({capacity} seats)")]
    CapacityExceeded { capacity: i32 },

    #[error("Transaction conflict, please retry: {0}")]
    TransactionConflict(String),

    #[error("Transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected storage failure: {0}")]
    Unknown(String),
}

impl ReservationError {
    /// Only infrastructure contention is worth resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReservationError::TransactionConflict(_) | ReservationError::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReservationError::EventNotFound(_) | ReservationError::RsvpNotFound { .. }
        )
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            // The only unique key a reservation can hit is (event_id, user_id).
            StoreError::UniqueViolation(_) => ReservationError::DuplicateReservation,
            StoreError::Conflict(msg) => ReservationError::TransactionConflict(msg),
            StoreError::Timeout(msg) => ReservationError::TransactionConflict(format!("timeout: {}", msg)),
            StoreError::Backend(msg) => ReservationError::Unknown(msg),
        }
    }
}

/// Failures of the owner-side event operations (create / update).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Event not found: {0}")]
    NotFound(Uuid),

    #[error("Capacity {capacity} is below the {attending} confirmed attendees")]
    CapacityBelowAttendance { capacity: i32, attending: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_translate_to_domain_errors() {
        assert_eq!(
            ReservationError::from(StoreError::UniqueViolation("rsvps_event_user_key".into())),
            ReservationError::DuplicateReservation
        );
        assert!(ReservationError::from(StoreError::Conflict("40001".into())).is_retryable());
        assert!(ReservationError::from(StoreError::Timeout("57014".into())).is_retryable());
        assert_eq!(
            ReservationError::from(StoreError::Backend("connection reset".into())),
            ReservationError::Unknown("connection reset".into())
        );
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        let event_id = Uuid::new_v4();
        assert!(!ReservationError::DuplicateReservation.is_retryable());
        assert!(!ReservationError::CapacityExceeded { capacity: 2 }.is_retryable());
        assert!(ReservationError::EventNotFound(event_id).is_not_found());
        assert!(ReservationError::RsvpNotFound { event_id }.is_not_found());
        assert!(ReservationError::Timeout(Duration::from_secs(5)).is_retryable());
    }
}
