//! Error taxonomy shared by the client-side components.
//!
//! Every backend response, session-file operation and scan failure ends up as
//! one of these variants. The reference server has its own `ApiError` in
//! `api::error`; the two meet only at the wire.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid credentials on login or registration.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Token missing, expired or rejected by the backend.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server error {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("camera error: {0}")]
    Camera(String),

    #[error("action not available while {0}")]
    InvalidState(&'static str),

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the cached session must be torn down after this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Unauthorized(_))
    }

    /// Transient failures the operator may simply re-issue.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a backend error response onto the taxonomy.
    ///
    /// `credentials` marks the unauthenticated login/registration calls, where
    /// a 401 means bad credentials rather than a stale token.
    pub fn from_status(status: u16, detail: String, credentials: bool) -> Self {
        match status {
            400 | 422 => Error::Validation(detail),
            401 if credentials => Error::Auth(detail),
            401 => Error::Unauthorized(detail),
            403 => Error::Forbidden(detail),
            404 => Error::NotFound(detail),
            409 => Error::Conflict(detail),
            _ => Error::Server { status, detail },
        }
    }
}
