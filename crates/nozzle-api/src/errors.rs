use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// API error types, each mapping to an HTTP status code.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing `username`/`password` headers on `/token` (400).
    #[error("username and/or password not found in header")]
    MissingCredentials,

    /// Credentials did not match the configured UAA credentials (401).
    #[error("invalid username and/or password")]
    InvalidCredentials,

    /// The `token` header named no currently-valid session token (401).
    #[error("invalid token supplied")]
    InvalidToken,

    /// Generic internal errors (500).
    #[error("internal server error: {message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingCredentials => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error kind as a string for logging and client identification.
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::MissingCredentials => "missing_credentials",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::InvalidToken => "invalid_token",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();
        let message = self.to_string();

        // Auth failures are routine; only server-side faults are errors.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error_type, message = %message, "API error occurred");
        } else {
            tracing::debug!(error_type, message = %message, "request rejected");
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}
