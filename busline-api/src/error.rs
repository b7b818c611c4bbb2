use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busline_core::{ConflictReason, CoreError, StateReason};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{code}: {message}")]
    Conflict { code: &'static str, message: String },
    #[error("{code}: {message}")]
    Unprocessable { code: &'static str, message: String },
    #[error("{0}")]
    Internal(String),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InvalidInput(msg) => AppError::BadRequest(msg),
            CoreError::NotFound(_) => AppError::NotFound(message),
            CoreError::Forbidden(msg) => AppError::Forbidden(msg),
            CoreError::Conflict(reason) => AppError::Conflict {
                code: match reason {
                    ConflictReason::TripNotBookable => "TRIP_NOT_BOOKABLE",
                    ConflictReason::SeatUnavailable(_) => "SEAT_UNAVAILABLE",
                },
                message: reason.to_string(),
            },
            CoreError::InvalidState(reason) => AppError::Unprocessable {
                code: match reason {
                    StateReason::AlreadyPaid => "ALREADY_PAID",
                    StateReason::BookingClosed => "BOOKING_CLOSED",
                    StateReason::HoldExpired => "HOLD_EXPIRED",
                    StateReason::PaymentDeclined => "PAYMENT_DECLINED",
                },
                message: reason.to_string(),
            },
            CoreError::InternalError(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            AppError::Unprocessable { code, message } => (StatusCode::UNPROCESSABLE_ENTITY, code, message),
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::Entity;

    fn status_of(err: CoreError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_core_error_status_codes() {
        assert_eq!(status_of(CoreError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::NotFound(Entity::Booking)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CoreError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(CoreError::Conflict(ConflictReason::SeatUnavailable("A01".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CoreError::InvalidState(StateReason::HoldExpired)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CoreError::InternalError("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
