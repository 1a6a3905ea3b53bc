use serde::Serialize;
use thiserror::Error;

/// Failure classes reported by the backend adapters.
///
/// Classification happens once, where the adapter still has the structured
/// error (SQLSTATE, auth `error_code`, HTTP status). Callers match on the
/// kind instead of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredentials,
    EmailNotConfirmed,
    UserAlreadyRegistered,
    WeakPassword,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    Conflict,
    Constraint,
    Validation,
    RateLimited,
    Network,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    /// Maps an HTTP status returned by a hosted endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Unauthenticated,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            429 => ErrorKind::RateLimited,
            502..=504 => ErrorKind::Network,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, message)
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => ErrorKind::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => ErrorKind::Conflict,
                Some("23503") => ErrorKind::Constraint,
                Some("23502") | Some("23514") | Some("22P02") | Some("22007") => {
                    ErrorKind::Validation
                }
                Some("42501") => ErrorKind::PermissionDenied,
                _ => ErrorKind::Internal,
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => ErrorKind::Network,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
            ErrorKind::Network
        } else if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        } else {
            ErrorKind::Internal
        };
        Self::new(kind, err.to_string())
    }
}

impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        let kind = if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
            ErrorKind::Network
        } else {
            ErrorKind::Internal
        };
        Self::new(kind, err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal, format!("malformed row: {}", err))
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}
