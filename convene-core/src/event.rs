use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EventError;

pub const MAX_CAPACITY: i32 = 10_000;

/// Keys a client may never set through a free-form update. The attendance
/// counter is owned by the reservation manager.
pub const PROTECTED_FIELDS: &[&str] = &[
    "currentAttendees",
    "current_attendees",
    "id",
    "_id",
    "createdBy",
    "created_by",
    "createdAt",
    "created_at",
    "updatedAt",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub date_time: DateTime<Utc>,
    pub capacity: i32,
    pub current_attendees: i32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn available_spots(&self) -> i32 {
        (self.capacity - self.current_attendees).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.current_attendees >= self.capacity
    }

    pub fn seat_summary(&self) -> SeatSummary {
        SeatSummary {
            id: self.id,
            title: self.title.clone(),
            capacity: self.capacity,
            current_attendees: self.current_attendees,
            available_spots: self.available_spots(),
        }
    }
}

/// Seat counts returned to callers after a reservation or release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatSummary {
    pub id: Uuid,
    pub title: String,
    pub capacity: i32,
    pub current_attendees: i32,
    pub available_spots: i32,
}

/// Request body for creating an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub location: String,
    pub date_time: DateTime<Utc>,
    pub capacity: i32,
}

impl NewEvent {
    /// Validates the request and builds the stored record. Attendance
    /// always starts at zero regardless of what the client sent.
    pub fn into_event(self, created_by: &str) -> Result<Event, EventError> {
        validate_title(&self.title)?;
        validate_description(&self.description)?;
        validate_location(&self.location)?;
        validate_capacity(self.capacity)?;

        let now = Utc::now();
        Ok(Event {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            location: self.location.trim().to_string(),
            date_time: self.date_time,
            capacity: self.capacity,
            current_attendees: 0,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of the descriptive fields of an event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
}

impl EventUpdate {
    /// Parses a free-form JSON body, dropping every protected key first.
    /// Returns the update together with the keys that were stripped.
    pub fn from_body(mut body: Value) -> Result<(Self, Vec<String>), EventError> {
        let object = body
            .as_object_mut()
            .ok_or_else(|| EventError::Validation("update body must be a JSON object".into()))?;

        let stripped: Vec<String> = PROTECTED_FIELDS
            .iter()
            .filter(|field| object.remove(**field).is_some())
            .map(|field| field.to_string())
            .collect();

        let update: EventUpdate = serde_json::from_value(body)
            .map_err(|e| EventError::Validation(e.to_string()))?;
        update.validate()?;

        Ok((update, stripped))
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(location) = &self.location {
            validate_location(location)?;
        }
        if let Some(capacity) = self.capacity {
            validate_capacity(capacity)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == EventUpdate::default()
    }

    /// Capacity guard shared by every store: a new capacity may not drop
    /// below the seats already taken.
    pub fn fits(&self, event: &Event) -> bool {
        self.capacity.map_or(true, |capacity| capacity >= event.current_attendees)
    }

    pub fn apply_to(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(location) = &self.location {
            event.location = location.trim().to_string();
        }
        if let Some(date_time) = self.date_time {
            event.date_time = date_time;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        event.updated_at = Utc::now();
    }
}

fn validate_title(title: &str) -> Result<(), EventError> {
    let len = title.trim().chars().count();
    if !(5..=100).contains(&len) {
        return Err(EventError::Validation(
            "Title must be between 5 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), EventError> {
    let len = description.chars().count();
    if !(10..=5000).contains(&len) {
        return Err(EventError::Validation(
            "Description must be between 10 and 5000 characters".into(),
        ));
    }
    Ok(())
}

fn validate_location(location: &str) -> Result<(), EventError> {
    let len = location.trim().chars().count();
    if len == 0 || len > 200 {
        return Err(EventError::Validation(
            "Location is required and cannot be more than 200 characters".into(),
        ));
    }
    Ok(())
}

fn validate_capacity(capacity: i32) -> Result<(), EventError> {
    if !(1..=MAX_CAPACITY).contains(&capacity) {
        return Err(EventError::Validation(format!(
            "Capacity must be between 1 and {}",
            MAX_CAPACITY
        )));
    }
    Ok(())
}
