use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum AppError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Search provider returned status {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("{message}")]
    FetchError { message: String, status_code: u16 },

    #[error("Persistence failure: {0}")]
    PersistenceError(String),

    #[error("Tool '{tool}' failed: {message}")]
    ExecutionError { tool: String, message: String },
}

impl AppError {
    pub fn fetch(message: impl Into<String>, status_code: u16) -> Self {
        AppError::FetchError {
            message: message.into(),
            status_code,
        }
    }

    /// HTTP status equivalent of this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ToolNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamError { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::FetchError { status_code, .. } => {
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::PersistenceError(_) | AppError::ExecutionError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::ValidationError(msg) | AppError::NotFound(msg) => msg.clone(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, code = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %message, code = status.as_u16(), "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
