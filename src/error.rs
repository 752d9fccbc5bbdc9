use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Precondition failures of the trip state machine. Surfaced to the caller
/// as client errors and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TripError {
    #[error("no vehicle assigned to driver")]
    NoVehicleAssigned,

    #[error("a trip is already in progress")]
    TripAlreadyActive,

    #[error("no trip in progress")]
    NoActiveTrip,

    #[error("ticket {0} not found")]
    TicketNotFound(String),

    #[error("ticket {0} has already been scanned")]
    TicketAlreadyScanned(String),

    #[error("ticket {0} is assigned to another driver")]
    TicketAssignedToOtherDriver(String),

    #[error("unreadable scan payload")]
    InvalidScanPayload,
}

impl TripError {
    pub fn code(&self) -> &'static str {
        match self {
            TripError::NoVehicleAssigned => "NO_VEHICLE_ASSIGNED",
            TripError::TripAlreadyActive => "TRIP_ALREADY_ACTIVE",
            TripError::NoActiveTrip => "NO_ACTIVE_TRIP",
            TripError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            TripError::TicketAlreadyScanned(_) => "TICKET_ALREADY_SCANNED",
            TripError::TicketAssignedToOtherDriver(_) => "TICKET_ASSIGNED_TO_OTHER_DRIVER",
            TripError::InvalidScanPayload => "INVALID_SCAN_PAYLOAD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("write conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Precondition(#[from] TripError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dependency failure: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unavailable(msg) => AppError::Dependency(msg),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Precondition(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Precondition(err) => err.code(),
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Dependency(_) => "DEPENDENCY_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AppError::Precondition(err) => err.to_string(),
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::Dependency(msg) | AppError::Internal(msg) => {
                tracing::error!(error = %msg, code = self.code(), "request failed");
                msg.clone()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
