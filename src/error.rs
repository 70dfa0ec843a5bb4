//! Error types for the Elidune circulation server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Numeric error codes returned to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    ItemNotAvailable = 7,
    MaxBorrowsReached = 11,
    BadValue = 18,
    InvalidState = 22,
    PolicyViolation = 23,
}

/// Business rules that can reject a circulation or reservation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    OutOfStock,
    MaxBorrowLimit,
    SameTitleTwice,
    BookCurrentlyAvailable,
    BookCurrentlyUnavailable,
    HasOverdueRecords,
    AlreadyReserved,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Policy::OutOfStock => "out of stock",
            Policy::MaxBorrowLimit => "max borrow limit",
            Policy::SameTitleTwice => "same title twice",
            Policy::BookCurrentlyAvailable => "book currently available",
            Policy::BookCurrentlyUnavailable => "book currently unavailable",
            Policy::HasOverdueRecords => "has overdue records",
            Policy::AlreadyReserved => "already reserved",
        };
        write!(f, "{}", message)
    }
}

/// Failures reported by a notification collaborator
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification receiver {0} not found")]
    ReceiverNotFound(i32),

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(Policy),

    #[error(transparent)]
    Notification(#[from] NotifyError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`AppError`], stable across messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    PolicyViolation,
    Unauthorized,
    Authentication,
    Validation,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::PolicyViolation(_) => ErrorKind::PolicyViolation,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Authentication(_) => ErrorKind::Authentication,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Notification(NotifyError::ReceiverNotFound(_)) => ErrorKind::NotFound,
            AppError::Database(_) | AppError::Notification(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub kind: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchData, msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::InvalidState, msg.clone())
            }
            AppError::PolicyViolation(policy) => {
                let code = match policy {
                    Policy::OutOfStock | Policy::BookCurrentlyUnavailable => {
                        ErrorCode::ItemNotAvailable
                    }
                    Policy::MaxBorrowLimit => ErrorCode::MaxBorrowsReached,
                    _ => ErrorCode::PolicyViolation,
                };
                (StatusCode::UNPROCESSABLE_ENTITY, code, policy.to_string())
            }
            AppError::Notification(NotifyError::ReceiverNotFound(id)) => (
                StatusCode::NOT_FOUND,
                ErrorCode::NoSuchData,
                format!("Notification receiver {} not found", id),
            ),
            AppError::Notification(e) => {
                tracing::error!("Notification error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::Failure,
                    "Notification delivery failed".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            kind: format!("{:?}", kind),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_messages() {
        assert_eq!(Policy::SameTitleTwice.to_string(), "same title twice");
        assert_eq!(Policy::HasOverdueRecords.to_string(), "has overdue records");
        assert_eq!(
            AppError::PolicyViolation(Policy::OutOfStock).to_string(),
            "Policy violation: out of stock"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(AppError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            AppError::PolicyViolation(Policy::MaxBorrowLimit).kind(),
            ErrorKind::PolicyViolation
        );
        assert_eq!(
            AppError::Notification(NotifyError::ReceiverNotFound(3)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppError::Notification(NotifyError::Delivery("smtp".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_response_status() {
        let response = AppError::Conflict("not ready".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::PolicyViolation(Policy::OutOfStock).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
