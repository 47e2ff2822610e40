//! Centralized API error handling
//!
//! Every terminal failure becomes a JSON body `{"error": "...", "code": "..."}` with a
//! non-2xx status. Validation and business-rule failures are raised before any
//! mutation; persistence and provider failures surface the underlying message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::payment::PaymentError;
use crate::store::StoreError;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests: {0}")]
    RateLimited(String),

    #[error("{0}")]
    ResourceUnavailable(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    EditWindowClosed(String),

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Upstream service error: {0}")]
    UpstreamError(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::EditWindowClosed(_) => "EDIT_WINDOW_CLOSED",
            ApiError::InvalidSignature => "INVALID_SIGNATURE",
            ApiError::UpstreamError(_) => "UPSTREAM_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::ResourceUnavailable(_)
            | ApiError::EditWindowClosed(_)
            | ApiError::InvalidSignature => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamError(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, code = %code, "Server error occurred");
        } else {
            tracing::debug!(error = %message, code = %code, "Client error occurred");
        }

        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::InvalidInput(format!("Validation error: {}", err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::UpstreamError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidInput(format!("Invalid JSON: {}", err))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => ApiError::ResourceUnavailable(err.to_string()),
            StoreError::NotFound => ApiError::NotFound("Booking not found".to_string()),
            StoreError::Database(e) => ApiError::Database(e.to_string()),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidSignature => ApiError::InvalidSignature,
            PaymentError::InvalidInput(message) => ApiError::InvalidInput(message),
            other => ApiError::UpstreamError(other.to_string()),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::UpstreamError(err.to_string())
    }
}

/// Failure talking to a third-party service (SMS, identity, messaging)
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    /// Turn a non-2xx response into `ProviderError::Status`
    pub async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
