//! Error types for web handlers.
//!
//! Bridges [`RaffleError`] to HTTP responses through Axum's `IntoResponse`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rifa_core::error::{RaffleError, StoreError};
use rifa_core::types::TicketNumber;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// Conflicts carry the unavailable numbers so the buyer can pick others.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Numbers that caused a conflict
    numbers: Vec<TicketNumber>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            numbers: Vec::new(),
            source: None,
        }
    }

    /// Attach the error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error listing the unavailable numbers.
    #[must_use]
    pub fn numbers_unavailable(numbers: Vec<TicketNumber>) -> Self {
        let mut err = Self::new(
            StatusCode::CONFLICT,
            "Some numbers are no longer available".to_string(),
            "NUMBERS_UNAVAILABLE",
        );
        err.numbers = numbers;
        err
    }

    /// Create a 409 Conflict error for a refused state transition.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "INVALID_STATE")
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// Create a 408 Request Timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, message.into(), "TIMEOUT")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<RaffleError> for AppError {
    fn from(err: RaffleError) -> Self {
        match err {
            RaffleError::Validation(message) => Self::validation(message),
            RaffleError::Conflict { numbers } => Self::numbers_unavailable(numbers),
            RaffleError::NotFound { resource, id } => Self::not_found(resource, id),
            RaffleError::UnknownProvider(name) => Self::not_found("provider", name),
            RaffleError::InvalidState(message) => Self::invalid_state(message),
            RaffleError::Storage(StoreError::Timeout) => {
                Self::timeout("The database did not answer in time")
            }
            err @ (RaffleError::Storage(_) | RaffleError::IdentityExtraction { .. }) => {
                Self::internal("An internal error occurred").with_source(err.into())
            }
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
    /// Unavailable numbers, on conflict.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    numbers: Vec<TicketNumber>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            numbers: self.numbers,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
