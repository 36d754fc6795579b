//! Error types for the DocShare server

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local file storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File type .{extension} is not supported. Allowed: {allowed}")]
    InvalidFileType { extension: String, allowed: String },

    #[error("File is too large ({size} bytes). Maximum allowed is {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single failed validation rule
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |e| FieldError {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(details)
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
}

impl AppError {
    fn internal(context: &str, detail: &dyn std::fmt::Display) -> (StatusCode, String) {
        tracing::error!("{}: {}", context, detail);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;

        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Validation(fields) => {
                details = Some(fields);
                (StatusCode::BAD_REQUEST, "Invalid request data".to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::Storage(e) => match e {
                StorageError::InvalidFileType { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
                StorageError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
                StorageError::FileNotFound(_) => {
                    (StatusCode::NOT_FOUND, "File does not exist".to_string())
                }
                StorageError::Io(e) => Self::internal("Storage IO error", &e),
            },
            AppError::Multipart(e) => {
                let status = e.status();
                if status == StatusCode::PAYLOAD_TOO_LARGE {
                    (status, "File is too large".to_string())
                } else if status.is_client_error() {
                    (StatusCode::BAD_REQUEST, e.body_text())
                } else {
                    Self::internal("Multipart error", &e)
                }
            }
            AppError::Internal(msg) => Self::internal("Internal error", &msg),
            AppError::Database(e) => Self::internal("Database error", &e),
            AppError::Token(e) => Self::internal("Token error", &e),
            AppError::PasswordHash(e) => Self::internal("Password hashing error", &e),
            AppError::Io(e) => Self::internal("IO error", &e),
            AppError::Json(e) => Self::internal("JSON error", &e),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: message,
            details,
        });

        (status, body).into_response()
    }
}

/// Whether a database error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
