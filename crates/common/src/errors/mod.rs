//! Error types for LessonForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for the generation pipeline's failure modes
//! - Retryable vs. terminal classification for upstream calls
//! - HTTP status code mapping
//! - Structured error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationError,
    MissingField,
    InvalidFormat,

    // Authentication errors
    Unauthorized,
    InvalidToken,
    ExpiredToken,

    // Pipeline errors
    StageNotApproved,

    // Resource errors
    NotFound,
    ProjectNotFound,
    OutlineNotFound,
    SectionNotFound,
    PromptNotFound,
    ContentNotFound,

    // Rate limiting
    RateLimited,

    // Database errors
    DatabaseError,
    ConnectionError,

    // External service errors
    UpstreamError,
    RetryExhausted,
    MalformedResponse,
    CacheError,

    // Internal errors
    InternalError,
    ConfigurationError,
    SerializationError,
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    // Pipeline errors
    #[error("Stage '{stage}' has {pending} unapproved item(s)")]
    StageNotApproved { stage: String, pending: usize },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Outline not found: {id}")]
    OutlineNotFound { id: String },

    #[error("Section not found: {id}")]
    SectionNotFound { id: String },

    #[error("Prompt not found: {id}")]
    PromptNotFound { id: String },

    #[error("Content item not found: {id}")]
    ContentNotFound { id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("LLM provider error{}: {message}", status_suffix(.status))]
    Upstream { status: Option<u16>, message: String },

    #[error("LLM request failed after {attempts} attempt(s): {last_error}")]
    RetryExhausted { attempts: u32, last_error: Box<AppError> },

    #[error("Malformed LLM response: {message}")]
    MalformedResponse { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::StageNotApproved { .. } => ErrorCode::StageNotApproved,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            AppError::OutlineNotFound { .. } => ErrorCode::OutlineNotFound,
            AppError::SectionNotFound { .. } => ErrorCode::SectionNotFound,
            AppError::PromptNotFound { .. } => ErrorCode::PromptNotFound,
            AppError::ContentNotFound { .. } => ErrorCode::ContentNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::MissingField { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } |
            AppError::InvalidToken |
            AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::ProjectNotFound { .. } |
            AppError::OutlineNotFound { .. } |
            AppError::SectionNotFound { .. } |
            AppError::PromptNotFound { .. } |
            AppError::ContentNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::StageNotApproved { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. } |
            AppError::RetryExhausted { .. } |
            AppError::MalformedResponse { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::CacheError { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether a failed LLM call is worth another attempt.
    ///
    /// Rate limits, timeouts, 5xx responses, transport failures and
    /// malformed or empty payloads are retryable; any other 4xx means the
    /// request itself is bad and repeating it cannot help.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Upstream { status: Some(status), .. } => {
                matches!(*status, 408 | 429) || *status >= 500
            }
            AppError::Upstream { status: None, .. } => true,
            AppError::MalformedResponse { .. } => true,
            AppError::HttpClient(e) => !e.is_builder(),
            AppError::Serialization(_) => true,
            _ => false,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" {}", s)).unwrap_or_default()
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string()
        }
    }
}
