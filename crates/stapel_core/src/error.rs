//! Error types for stapel core.

use crate::entity::EntityId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// An entity violates the replication envelope invariants.
    #[error("invalid envelope for entity {entity_id}: {message}")]
    InvalidEnvelope {
        /// The offending entity.
        entity_id: EntityId,
        /// Which invariant was violated.
        message: String,
    },

    /// An identifier could not be parsed.
    #[error("invalid entity id: {0}")]
    InvalidId(#[from] uuid::Error),
}

impl CoreError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an invalid envelope error.
    pub fn invalid_envelope(entity_id: EntityId, message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            entity_id,
            message: message.into(),
        }
    }
}
