//! Server error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ratchet_core::RatchetError;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Request body or path could not be decoded
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Ratchet operation failed
    #[error(transparent)]
    Ratchet(#[from] RatchetError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ServerError {
    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ratchet(err) => match err {
                RatchetError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
                RatchetError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
                RatchetError::SessionNotEstablished { .. }
                | RatchetError::NotInitialized { .. }
                | RatchetError::AlreadyInitialized { .. } => StatusCode::CONFLICT,
                RatchetError::StoreFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RatchetError::Entropy(_)
                | RatchetError::Primitive { .. }
                | RatchetError::LockPoisoned { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
