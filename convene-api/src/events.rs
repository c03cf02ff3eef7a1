use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use convene_core::{Event, EventError, EventUpdate, NewEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::{user_from_headers, AuthUser};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub available_spots: i32,
    pub is_full: bool,
    /// Only present for an authenticated caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_attending: Option<bool>,
}

impl EventView {
    fn new(event: Event, is_attending: Option<bool>) -> Self {
        Self {
            available_spots: event.available_spots(),
            is_full: event.is_full(),
            is_attending,
            event,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub success: bool,
    pub data: EventView,
}

fn respond(event: Event, is_attending: Option<bool>) -> Json<EventResponse> {
    Json(EventResponse {
        success: true,
        data: EventView::new(event, is_attending),
    })
}

/// POST /api/events
pub async fn create_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<NewEvent>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let event = req.into_event(&user.id)?;
    state.events.insert_event(&event).await?;

    info!(event_id = %event.id, capacity = event.capacity, "Event created");

    Ok((StatusCode::CREATED, respond(event, None)))
}

/// GET /api/events/{id}
/// Authentication is optional; a valid token adds `isAttending`.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<EventResponse>, AppError> {
    let event = state
        .events
        .get_event(event_id)
        .await?
        .ok_or(EventError::NotFound(event_id))?;

    let is_attending = match user_from_headers(&state, &headers) {
        Some(user) => Some(
            state
                .events
                .find_rsvp(event_id, &user.id)
                .await?
                .is_some_and(|rsvp| rsvp.status.occupies_seat()),
        ),
        None => None,
    };

    Ok(respond(event, is_attending))
}

/// PUT /api/events/{id}
/// Owner only. Server-owned keys such as `currentAttendees` are dropped
/// from the body before it is applied.
pub async fn update_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<EventResponse>, AppError> {
    let existing = state
        .events
        .get_event(event_id)
        .await?
        .ok_or(EventError::NotFound(event_id))?;

    if existing.created_by != user.id {
        return Err(AppError::AuthorizationError(
            "Not authorized to update this event".to_string(),
        ));
    }

    let (update, stripped) = EventUpdate::from_body(body)?;
    if !stripped.is_empty() {
        debug!(%event_id, ?stripped, "Ignored protected fields in event update");
    }
    if update.is_empty() {
        return Ok(respond(existing, None));
    }

    match state.events.update_event(event_id, &update).await? {
        Some(event) => Ok(respond(event, None)),
        None => {
            // The conditional write matched nothing: either the event was
            // removed meanwhile or the new capacity no longer fits.
            let current = state
                .events
                .get_event(event_id)
                .await?
                .ok_or(EventError::NotFound(event_id))?;
            Err(EventError::CapacityBelowAttendance {
                capacity: update.capacity.unwrap_or(current.capacity),
                attending: current.current_attendees,
            }
            .into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<EventView>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

fn list(events: Vec<Event>, is_attending: Option<bool>) -> Json<EventListResponse> {
    let data: Vec<EventView> = events
        .into_iter()
        .map(|event| EventView::new(event, is_attending))
        .collect();
    Json(EventListResponse {
        success: true,
        count: data.len(),
        data,
    })
}

/// DELETE /api/events/{id}
/// Owner only. The event's RSVPs go with it.
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let event = state
        .events
        .get_event(event_id)
        .await?
        .ok_or(EventError::NotFound(event_id))?;

    if event.created_by != user.id {
        return Err(AppError::AuthorizationError(
            "Not authorized to delete this event".to_string(),
        ));
    }

    if !state.events.delete_event(event_id).await? {
        return Err(EventError::NotFound(event_id).into());
    }

    info!(%event_id, released = event.current_attendees, "Event deleted");

    Ok(Json(DeleteResponse {
        success: true,
        message: "Event deleted successfully".to_string(),
    }))
}

/// GET /api/events/user/my-events
pub async fn my_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<EventListResponse>, AppError> {
    let events = state.events.list_events_by_owner(&user.id).await?;
    Ok(list(events, None))
}

/// GET /api/events/user/attending
pub async fn attending_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<EventListResponse>, AppError> {
    let events = state.events.list_attending_events(&user.id).await?;
    Ok(list(events, Some(true)))
}
