//! Error handling module
//!
//! Centralized error taxonomy for the storefront core. Cache and
//! rate-limiter backend failures never appear here: those layers
//! absorb backend errors locally and degrade to their in-process tier.

use thiserror::Error;

/// Application error types
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid transaction type: {0}")]
    InvalidTransactionType(String),

    #[error("Payment provider is not configured: {0}")]
    UpstreamMisconfigured(String),

    #[error("Payment provider endpoint not found: {0}")]
    UpstreamNotFound(String),

    #[error("Payment provider error: {0}")]
    UpstreamError(String),

    #[error("Payment provider declined the request: {0}")]
    UpstreamRejected(String),

    #[error("CSRF token verification failed")]
    CsrfValidationFailed,

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Request too large: {size} bytes exceeds limit of {limit} bytes")]
    RequestTooLarge { size: usize, limit: usize },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn http_status_code(&self) -> warp::http::StatusCode {
        use warp::http::StatusCode;
        match self {
            AppError::Validation(_)
            | AppError::InvalidTransactionType(_)
            | AppError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::CsrfValidationFailed => StatusCode::FORBIDDEN,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UpstreamMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamNotFound(_) | AppError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message. Upstream failures collapse to a generic
    /// retry-able message; the captured detail stays in logs and in the
    /// transaction row's gateway metadata.
    pub fn public_message(&self) -> String {
        match self {
            AppError::UpstreamNotFound(_) | AppError::UpstreamError(_) => {
                "Payment provider is temporarily unavailable. Please try again.".to_string()
            }
            AppError::UpstreamMisconfigured(_) => {
                "Payment gateway is not configured. Contact the operator.".to_string()
            }
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Application result type
pub type AppResult<T> = Result<T, AppError>;

impl warp::reject::Reject for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::UserNotFound,
            other => AppError::Database(other.to_string()),
        }
    }
}
