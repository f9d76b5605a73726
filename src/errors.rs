use crate::{
    models::user::InvalidUserField,
    services::{storage::StorageError, user_service::UserError},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// A lightweight wrapper for handler errors that keeps the message local.
///
/// Rendered as a plain-text body; clients get an English description of the
/// failure and its cause, never a structured error code.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "request failed");
        } else {
            tracing::warn!(status = self.status.as_u16(), error = %self.message, "request rejected");
        }

        (self.status, self.message).into_response()
    }
}

impl From<InvalidUserField> for AppError {
    fn from(err: InvalidUserField) -> Self {
        AppError::bad_request(format!("Could not parse request body: {}", err))
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        AppError::internal(format!("Could not query db: {}", err))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidObjectKey(_) => {
                AppError::bad_request(format!("Could not get file: {}", err))
            }
            other => AppError::internal(format!("Could not put file: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_is_a_client_error() {
        let err: AppError = StorageError::InvalidObjectKey("../etc/passwd".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("../etc/passwd"));
    }

    #[test]
    fn store_failures_are_server_errors() {
        let io = std::io::Error::other("disk full");
        let err: AppError = StorageError::Io(io).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.starts_with("Could not put file"));
        assert!(err.message.contains("disk full"));
    }
}
