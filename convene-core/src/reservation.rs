use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::SeatSummary;
use crate::repository::{ReservationStore, ReservationTx};
use crate::rsvp::Rsvp;
use crate::ReservationError;

/// Retry and timeout budget for a single reservation call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReservationPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_retry_backoff_ms() -> u64 { 25 }
fn default_transaction_timeout_ms() -> u64 { 5_000 }

impl ReservationPolicy {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            transaction_timeout_ms: default_transaction_timeout_ms(),
        }
    }
}

/// A committed reservation: the new RSVP and the seat counts it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub rsvp: Rsvp,
    pub event: SeatSummary,
}

/// Mediates every change to an event's attendance count.
///
/// Both operations run as one store transaction: the capacity check and the
/// increment are a single conditional write (`claim_seat`), and the RSVP row
/// is written in the same transaction, so a failure at any step leaves no
/// trace.
#[derive(Clone)]
pub struct ReservationManager {
    store: Arc<dyn ReservationStore>,
    policy: ReservationPolicy,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn ReservationStore>, policy: ReservationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    /// Takes one seat on `event_id` for `user_id`.
    pub async fn reserve_seat(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self
            .run("reserve_seat", move |deadline| self.try_reserve(event_id, user_id, deadline))
            .await?;

        info!(
            %event_id,
            user_id,
            available_spots = reservation.event.available_spots,
            "Seat reserved"
        );
        Ok(reservation)
    }

    /// Gives the caller's seat back. Returns the counts after the release.
    pub async fn release_seat(
        &self,
        event_id: Uuid,
        user_id: &str,
    ) -> Result<SeatSummary, ReservationError> {
        let seats = self
            .run("release_seat", move |deadline| self.try_release(event_id, user_id, deadline))
            .await?;

        info!(%event_id, user_id, available_spots = seats.available_spots, "Seat released");
        Ok(seats)
    }

    async fn try_reserve(
        &self,
        event_id: Uuid,
        user_id: &str,
        deadline: Instant,
    ) -> Result<Reservation, Attempt> {
        let work = async {
            let mut tx = self.store.begin().await?;
            let result = reserve_in(&mut *tx, event_id, user_id).await;
            Ok::<_, ReservationError>((tx, result))
        };
        let (tx, result) = self.before_commit(deadline, work).await?;
        finish(tx, result, deadline, self.policy.transaction_timeout()).await
    }

    async fn try_release(
        &self,
        event_id: Uuid,
        user_id: &str,
        deadline: Instant,
    ) -> Result<SeatSummary, Attempt> {
        let work = async {
            let mut tx = self.store.begin().await?;
            let result = release_in(&mut *tx, event_id, user_id).await;
            Ok::<_, ReservationError>((tx, result))
        };
        let (tx, result) = self.before_commit(deadline, work).await?;
        finish(tx, result, deadline, self.policy.transaction_timeout()).await
    }

    /// Bounds the part of an attempt that runs before commit. An elapsed
    /// future drops its transaction handle, which rolls back, so the
    /// attempt is safe to run again.
    async fn before_commit<T>(
        &self,
        deadline: Instant,
        work: impl Future<Output = Result<T, ReservationError>>,
    ) -> Result<T, Attempt> {
        match timeout_at(deadline, work).await {
            Ok(result) => result.map_err(Attempt::RolledBack),
            Err(_) => Err(Attempt::RolledBack(ReservationError::Timeout(
                self.policy.transaction_timeout(),
            ))),
        }
    }

    /// Runs one attempt per transaction under the timeout budget, retrying
    /// retryable failures with linear backoff. A commit that was issued but
    /// never acknowledged is not retried: its outcome is unknown.
    async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt_once: F) -> Result<T, ReservationError>
    where
        F: FnMut(Instant) -> Fut,
        Fut: Future<Output = Result<T, Attempt>>,
    {
        let budget = self.policy.transaction_timeout();
        let mut attempt = 1;

        loop {
            match attempt_once(Instant::now() + budget).await {
                Ok(value) => return Ok(value),
                Err(Attempt::RolledBack(err)) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(operation, attempt, error = %err, "Retrying reservation transaction");
                    sleep(self.policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(Attempt::RolledBack(err)) => return Err(err),
                Err(Attempt::Unacknowledged(err)) => {
                    warn!(operation, attempt, error = %err, "Commit not acknowledged in time; outcome unknown");
                    return Err(err);
                }
            }
        }
    }
}

/// How an attempt failed.
enum Attempt {
    /// Nothing was committed.
    RolledBack(ReservationError),
    /// Commit was sent but did not answer within the budget.
    Unacknowledged(ReservationError),
}

async fn reserve_in(
    tx: &mut dyn ReservationTx,
    event_id: Uuid,
    user_id: &str,
) -> Result<Reservation, ReservationError> {
    let event = tx
        .find_event(event_id)
        .await?
        .ok_or(ReservationError::EventNotFound(event_id))?;

    if tx.find_rsvp(event_id, user_id).await?.is_some() {
        return Err(ReservationError::DuplicateReservation);
    }

    if event.is_full() {
        return Err(ReservationError::CapacityExceeded { capacity: event.capacity });
    }

    // The read above is advisory; this write re-checks the predicate atomically.
    let event = tx
        .claim_seat(event_id)
        .await?
        .ok_or(ReservationError::CapacityExceeded { capacity: event.capacity })?;

    let rsvp = Rsvp::attending(event_id, user_id);
    tx.insert_rsvp(&rsvp).await?;

    Ok(Reservation { rsvp, event: event.seat_summary() })
}

async fn release_in(
    tx: &mut dyn ReservationTx,
    event_id: Uuid,
    user_id: &str,
) -> Result<SeatSummary, ReservationError> {
    let rsvp = tx
        .delete_rsvp(event_id, user_id)
        .await?
        .ok_or(ReservationError::RsvpNotFound { event_id })?;

    let event = if rsvp.status.occupies_seat() {
        tx.release_seat(event_id).await?
    } else {
        tx.find_event(event_id).await?
    };

    event
        .map(|event| event.seat_summary())
        .ok_or(ReservationError::EventNotFound(event_id))
}

async fn finish<T>(
    mut tx: Box<dyn ReservationTx>,
    result: Result<T, ReservationError>,
    deadline: Instant,
    budget: Duration,
) -> Result<T, Attempt> {
    match result {
        Ok(value) => match timeout_at(deadline, tx.commit()).await {
            // A store error on commit means the store rejected it.
            Ok(committed) => committed
                .map(|()| value)
                .map_err(|e| Attempt::RolledBack(e.into())),
            Err(_) => Err(Attempt::Unacknowledged(ReservationError::Timeout(budget))),
        },
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; transaction will be discarded on drop");
            }
            Err(Attempt::RolledBack(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, NewEvent};
    use crate::memory::MemoryStore;
    use crate::repository::EventRepository;
    use chrono::Utc;
    use futures_util::future::join_all;

    async fn seeded(capacity: i32) -> (MemoryStore, ReservationManager, Event) {
        let store = MemoryStore::new();
        let event = NewEvent {
            title: "Community picnic".to_string(),
            description: "Bring food, bring friends".to_string(),
            location: "Riverside park".to_string(),
            date_time: Utc::now(),
            capacity,
        }
        .into_event("organizer")
        .unwrap();
        store.insert_event(&event).await.unwrap();

        let policy = ReservationPolicy { retry_backoff_ms: 1, ..Default::default() };
        let manager = ReservationManager::new(Arc::new(store.clone()), policy);
        (store, manager, event)
    }

    async fn attendees(store: &MemoryStore, event_id: Uuid) -> i32 {
        store.get_event(event_id).await.unwrap().unwrap().current_attendees
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_overbooking_under_concurrency() {
        let (store, manager, event) = seeded(5).await;
        let event_id = event.id;

        let calls = (0..25).map(|i| {
            let manager = manager.clone();
            let user = format!("user-{}", i);
            tokio::spawn(async move { manager.reserve_seat(event_id, &user).await })
        });
        let results: Vec<_> = join_all(calls).await.into_iter().map(|r| r.unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let full = results
            .iter()
            .filter(|r| matches!(r, Err(ReservationError::CapacityExceeded { .. })))
            .count();

        assert_eq!(successes, 5);
        assert_eq!(full, 20);
        assert_eq!(attendees(&store, event.id).await, 5);
        assert_eq!(store.attending_count(event.id).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn test_three_users_race_for_two_seats() {
        let (store, manager, event) = seeded(2).await;
        let event_id = event.id;

        let calls = ["alice", "bob", "carol"].into_iter().map(|user| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reserve_seat(event_id, user).await })
        });
        let results: Vec<_> = join_all(calls).await.into_iter().map(|r| r.unwrap()).collect();

        let mut spots: Vec<i32> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|reservation| reservation.event.available_spots)
            .collect();
        spots.sort_unstable();
        assert_eq!(spots, vec![0, 1]);

        let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(rejected, vec![&ReservationError::CapacityExceeded { capacity: 2 }]);
        assert_eq!(attendees(&store, event.id).await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_reservation_rejected() {
        let (store, manager, event) = seeded(10).await;

        manager.reserve_seat(event.id, "alice").await.unwrap();
        let second = manager.reserve_seat(event.id, "alice").await;

        assert_eq!(second, Err(ReservationError::DuplicateReservation));
        assert_eq!(attendees(&store, event.id).await, 1);
    }

    #[tokio::test]
    async fn test_reserve_release_reserve_round_trip() {
        let (store, manager, event) = seeded(3).await;
        manager.reserve_seat(event.id, "bob").await.unwrap();
        let before = attendees(&store, event.id).await;

        manager.reserve_seat(event.id, "alice").await.unwrap();
        let released = manager.release_seat(event.id, "alice").await.unwrap();
        assert_eq!(released.current_attendees, before);
        manager.reserve_seat(event.id, "alice").await.unwrap();
        manager.release_seat(event.id, "alice").await.unwrap();

        assert_eq!(attendees(&store, event.id).await, before);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_in_effect() {
        let (store, manager, event) = seeded(3).await;
        manager.reserve_seat(event.id, "alice").await.unwrap();

        assert!(manager.release_seat(event.id, "alice").await.is_ok());
        assert_eq!(
            manager.release_seat(event.id, "alice").await,
            Err(ReservationError::RsvpNotFound { event_id: event.id })
        );
        assert_eq!(attendees(&store, event.id).await, 0);
    }

    #[tokio::test]
    async fn test_release_without_rsvp_never_goes_negative() {
        let (store, manager, event) = seeded(3).await;

        let result = manager.release_seat(event.id, "nobody").await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attendees(&store, event.id).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let (_store, manager, _event) = seeded(3).await;
        let missing = Uuid::new_v4();

        assert_eq!(
            manager.reserve_seat(missing, "alice").await,
            Err(ReservationError::EventNotFound(missing))
        );
    }

    #[tokio::test]
    async fn test_full_event_reports_capacity() {
        let (_store, manager, event) = seeded(1).await;
        manager.reserve_seat(event.id, "alice").await.unwrap();

        assert_eq!(
            manager.reserve_seat(event.id, "bob").await,
            Err(ReservationError::CapacityExceeded { capacity: 1 })
        );
    }

    #[tokio::test]
    async fn test_failed_rsvp_insert_rolls_back_increment() {
        let (store, manager, event) = seeded(3).await;
        store.fail_next_rsvp_insert();

        let result = manager.reserve_seat(event.id, "alice").await;

        assert!(matches!(result, Err(ReservationError::Unknown(_))));
        assert_eq!(attendees(&store, event.id).await, 0);
        assert_eq!(store.attending_count(event.id).await, 0);
        assert!(store.find_rsvp(event.id, "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_conflicts_are_retried() {
        let (store, manager, event) = seeded(3).await;
        store.fail_next_commits(2);

        let reservation = manager.reserve_seat(event.id, "alice").await.unwrap();

        assert_eq!(reservation.event.current_attendees, 1);
        assert_eq!(attendees(&store, event.id).await, 1);
    }

    #[tokio::test]
    async fn test_conflicts_beyond_budget_surface_to_caller() {
        let (store, manager, event) = seeded(3).await;
        store.fail_next_commits(manager.policy().max_attempts);

        let result = manager.reserve_seat(event.id, "alice").await;

        assert!(matches!(result, Err(ReservationError::TransactionConflict(_))));
        assert_eq!(attendees(&store, event.id).await, 0);
        assert_eq!(store.attending_count(event.id).await, 0);
    }

    fn manager_with(store: &MemoryStore, max_attempts: u32, timeout_ms: u64) -> ReservationManager {
        let policy = ReservationPolicy {
            max_attempts,
            retry_backoff_ms: 1,
            transaction_timeout_ms: timeout_ms,
        };
        ReservationManager::new(Arc::new(store.clone()), policy)
    }

    #[tokio::test]
    async fn test_slow_transaction_times_out_and_rolls_back() {
        let (store, _manager, event) = seeded(3).await;
        let manager = manager_with(&store, 2, 20);
        store.delay_claims(Duration::from_millis(200));

        let result = manager.reserve_seat(event.id, "alice").await;

        assert_eq!(result, Err(ReservationError::Timeout(Duration::from_millis(20))));
        assert_eq!(attendees(&store, event.id).await, 0);
        assert_eq!(store.attending_count(event.id).await, 0);
    }

    #[tokio::test]
    async fn test_slow_commit_is_not_applied_when_abandoned() {
        let (store, _manager, event) = seeded(3).await;
        let manager = manager_with(&store, 1, 20);
        store.delay_commits(Duration::from_millis(200));

        let result = manager.reserve_seat(event.id, "alice").await;

        assert_eq!(result, Err(ReservationError::Timeout(Duration::from_millis(20))));
        assert_eq!(attendees(&store, event.id).await, 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_reserve_commit_is_not_retried() {
        let (store, _manager, event) = seeded(3).await;
        let manager = manager_with(&store, 3, 30);
        store.delay_commit_acks(Duration::from_millis(100));

        let result = manager.reserve_seat(event.id, "alice").await;

        // The write landed; a retry would have misreported it as a duplicate.
        assert_eq!(result, Err(ReservationError::Timeout(Duration::from_millis(30))));
        assert_eq!(attendees(&store, event.id).await, 1);
        assert_eq!(store.attending_count(event.id).await, 1);
    }

    #[tokio::test]
    async fn test_unacknowledged_release_commit_is_not_retried() {
        let (store, _manager, event) = seeded(3).await;
        let manager = manager_with(&store, 3, 30);
        manager.reserve_seat(event.id, "alice").await.unwrap();
        store.delay_commit_acks(Duration::from_millis(100));

        let result = manager.release_seat(event.id, "alice").await;

        assert_eq!(result, Err(ReservationError::Timeout(Duration::from_millis(30))));
        assert_eq!(attendees(&store, event.id).await, 0);
        assert!(store.find_rsvp(event.id, "alice").await.unwrap().is_none());
    }

    #[test]
    fn test_policy_backoff_is_linear() {
        let policy = ReservationPolicy { retry_backoff_ms: 10, ..Default::default() };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(3), Duration::from_millis(30));
    }
}
