//! Application error type.
//!
//! Every fallible operation in the services returns [`AppResult`]. Handlers
//! return `AppError` directly and axum turns it into the standard error
//! envelope through the [`IntoResponse`] impl below.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across all services.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body or parameters failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing or invalid access token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A mutating statement was sent while the service is read-only.
    #[error("read-only mode: {0}")]
    ReadOnly(String),

    /// Tab with the given ID does not exist.
    #[error("tab not found: {0}")]
    TabNotFound(String),

    /// ClickHouse rejected the statement or returned an unreadable body.
    #[error("{message}")]
    ClickHouse {
        /// HTTP status returned by ClickHouse, if a response was received.
        status: Option<u16>,
        /// Error text returned by ClickHouse.
        message: String,
    },

    /// Another service or the network failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Tab repository failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a ClickHouse error from a server response.
    pub fn clickhouse(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::ClickHouse {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::ReadOnly(_) => StatusCode::FORBIDDEN,
            AppError::TabNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ClickHouse { .. } | AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error kind for client handling.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::ReadOnly(_) => "READ_ONLY",
            AppError::TabNotFound(_) => "NOT_FOUND",
            AppError::ClickHouse { .. } => "CLICKHOUSE_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Extra structured details attached to the error response.
    pub fn context(&self) -> Option<serde_json::Value> {
        match self {
            AppError::TabNotFound(id) => Some(json!({ "tab_id": id })),
            AppError::ClickHouse {
                status: Some(status),
                ..
            } => Some(json!({ "upstream_status": status })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = ApiResponse::from_error(&self);
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
