use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use convene_core::{EventError, ReservationError, StoreError};
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    Reservation(ReservationError),
    InternalServerError(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    code: &'static str,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    available_spots: Option<i32>,
}

impl ErrorBody {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            retryable: false,
            available_spots: None,
        }
    }
}

fn reservation_response(err: ReservationError) -> (StatusCode, ErrorBody) {
    match err {
        ReservationError::EventNotFound(_) => {
            (StatusCode::NOT_FOUND, ErrorBody::new("EVENT_NOT_FOUND", "Event not found"))
        }
        ReservationError::RsvpNotFound { .. } => {
            (StatusCode::NOT_FOUND, ErrorBody::new("RSVP_NOT_FOUND", "RSVP not found"))
        }
        ReservationError::DuplicateReservation => (
            StatusCode::BAD_REQUEST,
            ErrorBody::new("ALREADY_RSVPD", "You have already RSVP'd to this event"),
        ),
        ReservationError::CapacityExceeded { .. } => (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                available_spots: Some(0),
                ..ErrorBody::new("EVENT_FULL", "Event is at full capacity")
            },
        ),
        ReservationError::TransactionConflict(detail) => {
            tracing::warn!("Reservation gave up after conflicts: {}", detail);
            (
                StatusCode::CONFLICT,
                ErrorBody {
                    retryable: true,
                    ..ErrorBody::new("TRANSACTION_CONFLICT", "This event is busy right now, please try again")
                },
            )
        }
        ReservationError::Timeout(after) => {
            tracing::warn!("Reservation timed out after {:?}", after);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    retryable: true,
                    ..ErrorBody::new("TIMEOUT", "The request took too long, please try again")
                },
            )
        }
        ReservationError::Unknown(detail) => {
            tracing::error!("Internal Server Error: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("INTERNAL_ERROR", "Internal Server Error"),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorBody::new("UNAUTHENTICATED", msg))
            }
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, ErrorBody::new("FORBIDDEN", msg)),
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new("VALIDATION_ERROR", msg))
            }
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, ErrorBody::new("NOT_FOUND", msg)),
            AppError::Reservation(err) => reservation_response(err),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("INTERNAL_ERROR", "Internal Server Error"),
                )
            }
        };

        let retryable = body.retryable;
        let mut response = (status, Json(body)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        AppError::Reservation(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<EventError> for AppError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Validation(msg) => AppError::ValidationError(msg),
            EventError::NotFound(_) => AppError::NotFoundError("Event not found".to_string()),
            err @ EventError::CapacityBelowAttendance { .. } => AppError::ValidationError(err.to_string()),
            EventError::Store(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn status_of(err: ReservationError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_reservation_status_codes() {
        assert_eq!(status_of(ReservationError::EventNotFound(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ReservationError::RsvpNotFound { event_id: Uuid::new_v4() }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(ReservationError::DuplicateReservation), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ReservationError::CapacityExceeded { capacity: 3 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ReservationError::TransactionConflict("40001".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ReservationError::Timeout(Duration::from_secs(5))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ReservationError::Unknown("disk on fire".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_errors_carry_retry_after() {
        let response = AppError::from(ReservationError::TransactionConflict("40001".into())).into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");

        let response = AppError::from(ReservationError::DuplicateReservation).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_capacity_below_attendance_is_a_validation_error() {
        let err = AppError::from(EventError::CapacityBelowAttendance { capacity: 2, attending: 5 });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
