//! Unified HTTP error surface: every layer error maps to a status code and a
//! machine-readable error code rendered as JSON.

use crate::booking::allocator::AllocatorError;
use crate::booking::orchestrator::BookingError;
use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::ledger::LedgerError;
use crate::payments::error::PaymentError;
use crate::reconciliation::ReconciliationError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error as log_error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TripNotFound,
    TripInactive,
    SeatsTaken,
    InvalidSeatRequest,
    TicketNotFound,
    CancellationRejected,
    DuplicateTransaction,
    PaymentNotFound,
    Forbidden,
    WebhookAuthFailed,
    MalformedWebhook,
    ProviderUnavailable,
    ValidationError,
    DatabaseError,
    InternalError,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    /// Conflicting seat numbers, set for seat-taken conflicts only.
    pub seats: Option<Vec<i32>>,
}

impl AppError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            seats: None,
        }
    }

    pub fn not_found(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            message,
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seats: Option<Vec<i32>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log_error!(code = ?self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                seats: self.seats,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AllocatorError> for AppError {
    fn from(error: AllocatorError) -> Self {
        match &error {
            AllocatorError::TripNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::TripNotFound, error.to_string())
            }
            AllocatorError::TripInactive(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCode::TripInactive,
                error.to_string(),
            ),
            AllocatorError::SeatsTaken(seats) => {
                let mut mapped =
                    Self::new(StatusCode::CONFLICT, ErrorCode::SeatsTaken, error.to_string());
                mapped.seats = Some(seats.clone());
                mapped
            }
            AllocatorError::SeatOutOfRange { .. } | AllocatorError::InvalidRequest(_) => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidSeatRequest,
                error.to_string(),
            ),
            AllocatorError::TicketNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::TicketNotFound, error.to_string())
            }
            AllocatorError::Storage(db) => Self::from_database(db),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        match error {
            BookingError::Allocator(inner) => inner.into(),
            BookingError::Ledger(inner) => inner.into(),
            BookingError::Gateway(inner) => inner.into(),
            BookingError::PastDeparture => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::CancellationRejected,
                "Cannot cancel booking for past trip",
            ),
            BookingError::TicketNotActive(_) => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::CancellationRejected,
                error.to_string(),
            ),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        match &error {
            LedgerError::DuplicateTransactionRef(_) => Self::new(
                StatusCode::CONFLICT,
                ErrorCode::DuplicateTransaction,
                error.to_string(),
            ),
            LedgerError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::PaymentNotFound, error.to_string())
            }
            LedgerError::Invalid(_) => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::ValidationError,
                error.to_string(),
            ),
            LedgerError::Storage(db) => Self::from_database(db),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &error {
            PaymentError::ValidationError { .. } => ErrorCode::ValidationError,
            PaymentError::WebhookVerificationError { .. } => ErrorCode::WebhookAuthFailed,
            PaymentError::WebhookPayloadError { .. } => ErrorCode::MalformedWebhook,
            _ => ErrorCode::ProviderUnavailable,
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<ReconciliationError> for AppError {
    fn from(error: ReconciliationError) -> Self {
        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &error {
            ReconciliationError::AuthFailed(_) => ErrorCode::WebhookAuthFailed,
            ReconciliationError::MissingReference | ReconciliationError::Malformed(_) => {
                ErrorCode::MalformedWebhook
            }
            ReconciliationError::VerificationUnavailable(_) => ErrorCode::ProviderUnavailable,
            ReconciliationError::Provider(_) => ErrorCode::ValidationError,
            _ => ErrorCode::InternalError,
        };
        Self::new(status, code, error.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        Self::internal(error.to_string())
    }
}

impl AppError {
    fn from_database(error: &DatabaseError) -> Self {
        // Internals stay in the logs; clients get a generic message.
        log_error!(kind = ?error.kind, message = %error.message, "database failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::DatabaseError,
            "a storage error occurred",
        )
    }
}
