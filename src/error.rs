use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application.
///
/// Matching failures (no entry found, amount mismatch, refund) are NOT
/// errors - they travel as unmatched outcomes with a reason string.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source fetch error: {0}")]
    Source(#[from] SourceError),

    #[error("Deposit error: {0}")]
    Deposit(#[from] DepositError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("External error: {0}")]
    External(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Settlement-source fetch errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Authentication rejected by settlement source (status {0})")]
    AuthFailed(u16),

    #[error("Retries exhausted after {attempts} attempts (last status {status})")]
    RetriesExhausted { status: u16, attempts: u32 },

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Deposit-grouping errors surfaced to the operator
#[derive(Error, Debug)]
pub enum DepositError {
    #[error("No matched entries pending deposit")]
    NoPendingEntries,

    #[error("Entries may have already been deposited elsewhere")]
    EmptyIntersection,
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
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Invalid input: {}", msg),
            ),
            AppError::Config(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONFIG_ERROR",
                format!("Configuration error: {}", msg),
            ),
            AppError::Deposit(e) => (StatusCode::CONFLICT, "DEPOSIT_ERROR", e.to_string()),
            AppError::Source(e) => (
                StatusCode::BAD_GATEWAY,
                "SOURCE_FETCH_ERROR",
                e.to_string(),
            ),
            AppError::Store(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                msg.clone(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::External(format!("HTTP request error: {:?}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
