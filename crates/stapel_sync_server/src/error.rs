//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors a sync round can surface to the caller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bearer token did not resolve to a user.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request violates the protocol contract.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A stored row failed an envelope invariant.
    #[error(transparent)]
    Core(#[from] stapel_core::CoreError),
}

impl ServerError {
    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
