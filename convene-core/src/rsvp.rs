use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Attending,
    Maybe,
    NotAttending,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Attending => "attending",
            RsvpStatus::Maybe => "maybe",
            RsvpStatus::NotAttending => "not_attending",
        }
    }

    /// Only attending RSVPs are counted against capacity.
    pub fn occupies_seat(&self) -> bool {
        matches!(self, RsvpStatus::Attending)
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown RSVP status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for RsvpStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attending" => Ok(RsvpStatus::Attending),
            "maybe" => Ok(RsvpStatus::Maybe),
            "not_attending" => Ok(RsvpStatus::NotAttending),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
}

impl Rsvp {
    pub fn attending(event_id: Uuid, user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id: user_id.to_string(),
            status: RsvpStatus::Attending,
            created_at: Utc::now(),
        }
    }
}
