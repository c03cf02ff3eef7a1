use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::event::{Event, EventUpdate};
use crate::repository::{EventRepository, ReservationStore, ReservationTx};
use crate::rsvp::Rsvp;
use crate::StoreError;

#[derive(Debug, Clone, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    rsvps: HashMap<(Uuid, String), Rsvp>,
}

#[derive(Default)]
struct Faults {
    fail_next_insert: AtomicBool,
    commit_conflicts: AtomicU32,
    commit_delay_ms: AtomicU64,
    ack_delay_ms: AtomicU64,
    claim_delay_ms: AtomicU64,
}

fn store_millis(slot: &AtomicU64, delay: Duration) {
    slot.store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
}

async fn pause(slot: &AtomicU64) {
    let millis = slot.load(Ordering::SeqCst);
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// In-process store with the same transactional contract as the database.
///
/// Transactions are serialised behind one async mutex and write to a staged
/// copy of the tables; commit swaps the copy in, anything else discards it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `insert_rsvp` fails with a backend error.
    pub fn fail_next_rsvp_insert(&self) {
        self.faults.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// The next `count` commits fail with a conflict.
    pub fn fail_next_commits(&self, count: u32) {
        self.faults.commit_conflicts.store(count, Ordering::SeqCst);
    }

    /// Every commit sleeps for `delay` before applying.
    pub fn delay_commits(&self, delay: Duration) {
        store_millis(&self.faults.commit_delay_ms, delay);
    }

    /// Every commit applies its writes, then sleeps for `delay` before
    /// returning. Abandoning the commit during the sleep keeps the writes.
    pub fn delay_commit_acks(&self, delay: Duration) {
        store_millis(&self.faults.ack_delay_ms, delay);
    }

    /// Every `claim_seat` sleeps for `delay` first.
    pub fn delay_claims(&self, delay: Duration) {
        store_millis(&self.faults.claim_delay_ms, delay);
    }

    /// Committed attending RSVPs for an event.
    pub async fn attending_count(&self, event_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .rsvps
            .values()
            .filter(|rsvp| rsvp.event_id == event_id && rsvp.status.occupies_seat())
            .count()
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    staged: Tables,
    faults: Arc<Faults>,
}

impl MemoryTx {
    fn staged(&mut self) -> Result<&mut Tables, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::Backend("transaction already finished".into()));
        }
        Ok(&mut self.staged)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn ReservationTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            staged,
            faults: self.faults.clone(),
        }))
    }
}

#[async_trait]
impl ReservationTx for MemoryTx {
    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.staged()?.events.get(&event_id).cloned())
    }

    async fn find_rsvp(&mut self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let key = (event_id, user_id.to_string());
        Ok(self.staged()?.rsvps.get(&key).cloned())
    }

    async fn claim_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        pause(&self.faults.claim_delay_ms).await;
        let tables = self.staged()?;
        match tables.events.get_mut(&event_id) {
            Some(event) if event.current_attendees < event.capacity => {
                event.current_attendees += 1;
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError> {
        if self.faults.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected insert failure".into()));
        }

        let tables = self.staged()?;
        let key = (rsvp.event_id, rsvp.user_id.clone());
        if tables.rsvps.contains_key(&key) {
            return Err(StoreError::UniqueViolation("rsvps (event_id, user_id)".into()));
        }
        tables.rsvps.insert(key, rsvp.clone());
        Ok(())
    }

    async fn delete_rsvp(&mut self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let key = (event_id, user_id.to_string());
        Ok(self.staged()?.rsvps.remove(&key))
    }

    async fn release_seat(&mut self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let tables = self.staged()?;
        Ok(tables.events.get_mut(&event_id).map(|event| {
            event.current_attendees = (event.current_attendees - 1).max(0);
            event.clone()
        }))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Backend("transaction already finished".into()))?;

        pause(&self.faults.commit_delay_ms).await;

        let conflicted = self
            .faults
            .commit_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Err(StoreError::Conflict("injected serialization failure".into()));
        }

        *guard = std::mem::take(&mut self.staged);
        pause(&self.faults.ack_delay_ms).await;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take();
        self.staged = Tables::default();
        Ok(())
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::UniqueViolation(format!("events.id {}", event.id)));
        }
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.lock().await.events.get(&id).cloned())
    }

    async fn update_event(&self, id: Uuid, update: &EventUpdate) -> Result<Option<Event>, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.events.get_mut(&id) {
            Some(event) if update.fits(event) => {
                update.apply_to(event);
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_event(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.events.remove(&id).is_none() {
            return Ok(false);
        }
        tables.rsvps.retain(|(event_id, _), _| *event_id != id);
        Ok(true)
    }

    async fn list_events_by_owner(&self, owner: &str) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.lock().await;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|event| event.created_by == owner)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn list_attending_events(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.lock().await;
        let mut events: Vec<Event> = tables
            .rsvps
            .values()
            .filter(|rsvp| rsvp.user_id == user_id && rsvp.status.occupies_seat())
            .filter_map(|rsvp| tables.events.get(&rsvp.event_id).cloned())
            .collect();
        events.sort_by(|a, b| a.date_time.cmp(&b.date_time));
        Ok(events)
    }

    async fn find_rsvp(&self, event_id: Uuid, user_id: &str) -> Result<Option<Rsvp>, StoreError> {
        let key = (event_id, user_id.to_string());
        Ok(self.tables.lock().await.rsvps.get(&key).cloned())
    }

    async fn list_rsvps_for_user(&self, user_id: &str) -> Result<Vec<Rsvp>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rsvps: Vec<Rsvp> = tables
            .rsvps
            .values()
            .filter(|rsvp| rsvp.user_id == user_id)
            .cloned()
            .collect();
        rsvps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rsvps)
    }

    async fn list_attendees(&self, event_id: Uuid) -> Result<Vec<Rsvp>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rsvps: Vec<Rsvp> = tables
            .rsvps
            .values()
            .filter(|rsvp| rsvp.event_id == event_id && rsvp.status.occupies_seat())
            .cloned()
            .collect();
        rsvps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rsvps)
    }
}
