use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use convene_core::{Reservation, Rsvp, SeatSummary};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub success: bool,
    pub message: String,
    pub data: Reservation,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpWithEvent {
    #[serde(flatten)]
    pub rsvp: Rsvp,
    /// `None` if the event was deleted after the RSVP was listed.
    pub event: Option<SeatSummary>,
}

#[derive(Debug, Serialize)]
pub struct RsvpListResponse<T> {
    pub success: bool,
    pub count: usize,
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub success: bool,
    pub is_attending: bool,
    pub data: Option<Rsvp>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/rsvp/my-rsvps", get(my_rsvps))
        .route("/api/rsvp/check/{event_id}", get(check_rsvp))
        .route("/api/rsvp/{event_id}", post(reserve).delete(cancel))
        .route("/api/rsvp/{event_id}/attendees", get(attendees))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/rsvp/{event_id}
pub async fn reserve(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<ReserveResponse>, AppError> {
    let reservation = state.reservations.reserve_seat(event_id, &user.id).await?;

    info!(
        %event_id,
        user_id = %user.id,
        available_spots = reservation.event.available_spots,
        "RSVP confirmed"
    );

    Ok(Json(ReserveResponse {
        success: true,
        message: "Successfully RSVP'd to event".to_string(),
        data: reservation,
    }))
}

/// DELETE /api/rsvp/{event_id}
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let seats = state.reservations.release_seat(event_id, &user.id).await?;

    info!(%event_id, user_id = %user.id, available_spots = seats.available_spots, "RSVP cancelled");

    Ok(Json(CancelResponse {
        success: true,
        message: "RSVP cancelled successfully".to_string(),
    }))
}

/// GET /api/rsvp/my-rsvps
pub async fn my_rsvps(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RsvpListResponse<RsvpWithEvent>>, AppError> {
    let rsvps = state.events.list_rsvps_for_user(&user.id).await?;

    let mut data = Vec::with_capacity(rsvps.len());
    for rsvp in rsvps {
        let event = state.events.get_event(rsvp.event_id).await?;
        data.push(RsvpWithEvent {
            rsvp,
            event: event.as_ref().map(|e| e.seat_summary()),
        });
    }

    Ok(Json(RsvpListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// GET /api/rsvp/check/{event_id}
pub async fn check_rsvp(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<CheckResponse>, AppError> {
    let rsvp = state.events.find_rsvp(event_id, &user.id).await?;

    Ok(Json(CheckResponse {
        success: true,
        is_attending: rsvp.as_ref().is_some_and(|r| r.status.occupies_seat()),
        data: rsvp,
    }))
}

/// GET /api/rsvp/{event_id}/attendees
/// Only the event owner may list attendees.
pub async fn attendees(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<RsvpListResponse<Rsvp>>, AppError> {
    let event = state
        .events
        .get_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Event not found".to_string()))?;

    if event.created_by != user.id {
        return Err(AppError::AuthorizationError(
            "Not authorized to view attendees for this event".to_string(),
        ));
    }

    let data = state.events.list_attendees(event_id).await?;

    Ok(Json(RsvpListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}
