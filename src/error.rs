use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_api_key() -> Self {
        ApiError::Unauthorized("INVALID_API_KEY", "Unknown or missing clinic API key".into())
    }

    pub fn not_found(entity: &str) -> Self {
        ApiError::NotFound("NOT_FOUND", format!("{entity} not found"))
    }

    /// Optimistic-concurrency loss at booking time. Expected outcome, not a
    /// fault: the caller should re-query availability.
    pub fn slot_taken() -> Self {
        ApiError::Conflict(
            "SLOT_NOT_AVAILABLE",
            "The requested slot is no longer available".into(),
        )
    }

    /// The appointment moved to another status between the caller's read and
    /// this write. Re-read and retry.
    pub fn appointment_state_changed() -> Self {
        ApiError::Conflict(
            "APPOINTMENT_STATE_CHANGED",
            "Appointment status changed concurrently".into(),
        )
    }

    pub fn offer_not_pending() -> Self {
        ApiError::Conflict(
            "OFFER_NOT_PENDING",
            "Move offer is no longer pending".into(),
        )
    }

    pub fn db(e: sqlx::Error) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}
