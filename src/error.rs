use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Loan error: {0}")]
    Loan(#[from] LoanError),

    /// Lock timeouts, deadlocks and other store conditions the caller may retry
    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Loan-related errors
#[derive(Error, Debug)]
pub enum LoanError {
    #[error("loan not found: {0}")]
    NotFound(Uuid),

    #[error("member not found: {0}")]
    MemberNotFound(Uuid),

    /// The loan already left `pending`; carries the lifecycle message
    #[error("{0}")]
    AlreadyProcessed(String),

    #[error("Loan has an unknown or unprocessable status: {0}")]
    UnprocessableStatus(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("loan term months cannot be zero")]
    InvalidTerm,

    #[error("loan amount is outside the supported range")]
    AmountOutOfRange,

    #[error("no loan history found for loan {0}")]
    NoHistory(Uuid),
}

impl AppError {
    /// Whether the caller can safely resubmit the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            match db.code().as_deref() {
                // lock_not_available / query_canceled (lock_timeout fired)
                Some("55P03") | Some("57014") => {
                    return AppError::Transient("lock wait timed out".to_string())
                }
                // deadlock_detected / serialization_failure
                Some("40P01") | Some("40001") => {
                    return AppError::Transient("transaction conflict".to_string())
                }
                _ => {}
            }
        }

        match error {
            sqlx::Error::PoolTimedOut => {
                AppError::Transient("database connection pool exhausted".to_string())
            }
            other => AppError::Database(other),
        }
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Loan(LoanError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "LOAN_NOT_FOUND",
                "loan not found".to_string(),
                Some(serde_json::json!({ "loan_id": id })),
            ),
            AppError::Loan(LoanError::MemberNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "MEMBER_NOT_FOUND",
                "member not found".to_string(),
                Some(serde_json::json!({ "member_id": id })),
            ),
            AppError::Loan(LoanError::AlreadyProcessed(message)) => (
                StatusCode::BAD_REQUEST,
                "LOAN_ALREADY_PROCESSED",
                message,
                None,
            ),
            AppError::Loan(LoanError::NoHistory(id)) => (
                StatusCode::NOT_FOUND,
                "LOAN_HISTORY_NOT_FOUND",
                "loan history not found".to_string(),
                Some(serde_json::json!({ "loan_id": id })),
            ),
            AppError::Loan(LoanError::AmountOutOfRange) => (
                StatusCode::BAD_REQUEST,
                "AMOUNT_OUT_OF_RANGE",
                "loan amount is outside the supported range".to_string(),
                None,
            ),
            AppError::Loan(LoanError::InvalidTerm) => (
                StatusCode::BAD_REQUEST,
                "INVALID_LOAN_TERM",
                "loan term must be greater than zero months".to_string(),
                None,
            ),
            AppError::Loan(err @ LoanError::UnprocessableStatus(_)) => {
                error!("Loan data integrity problem: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UNPROCESSABLE_LOAN_STATUS",
                    err.to_string(),
                    None,
                )
            }
            AppError::Loan(err @ LoanError::InvalidTransition { .. }) => {
                error!("Rejected lifecycle transition: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVALID_TRANSITION",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AppError::Transient(reason) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RETRYABLE",
                format!("Temporary failure ({}), please retry", reason),
                Some(serde_json::json!({ "retryable": true })),
            ),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
            AppError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", message, None)
            }
            AppError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message, None)
            }
            AppError::Forbidden(message) => (StatusCode::FORBIDDEN, "FORBIDDEN", message, None),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.".to_string(),
                None,
            ),
            AppError::Database(err) => {
                error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            other => {
                error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
