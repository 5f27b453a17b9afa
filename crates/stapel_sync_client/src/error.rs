//! Error types for the sync client.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync round.
///
/// A failed round never mutates durable state; every variant leaves the
/// change queue and the cursor exactly as they were, so retrying is
/// always safe.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the round can be retried as-is.
        retryable: bool,
    },

    /// The peer sent something the protocol cannot make sense of.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local entity store error while applying server changes.
    #[error("store error: {0}")]
    Store(#[from] stapel_core::CoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a fresh round may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Protocol(_) | SyncError::Store(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("401 unauthorized").is_retryable());
        assert!(!SyncError::Protocol("bad payload".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::transport_retryable("timed out");
        assert_eq!(err.to_string(), "transport error: timed out");
    }
}
