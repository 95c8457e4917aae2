//! Error taxonomy for the service layer and its HTTP projection.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

/// Errors that can occur in service layer operations.
///
/// Engine-internal guard failures never reach this type; they are absorbed
/// as no-ops inside the room task. Only conditions a caller must see are
/// surfaced here.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No room exists under the given code.
    #[error("room `{0}` not found")]
    RoomNotFound(String),
    /// A non-member tried to join a room whose game already started.
    #[error("room `{0}` has already started")]
    RoomAlreadyStarted(String),
    /// The room task is gone and can no longer answer.
    #[error("room `{0}` is no longer available")]
    RoomClosed(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RoomNotFound(room) => AppError::NotFound(format!("room `{room}`")),
            ServiceError::RoomAlreadyStarted(room) => {
                AppError::Conflict(format!("room `{room}` has already started"))
            }
            ServiceError::RoomClosed(room) => {
                AppError::ServiceUnavailable(format!("room `{room}` is no longer available"))
            }
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
