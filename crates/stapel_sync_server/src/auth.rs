//! Bearer-token resolution for the sync endpoint.

use crate::error::{ServerError, ServerResult};
use crate::store::UserId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Maps a bearer token to the user whose rows the request may touch.
///
/// Token issuance and expiry live outside this crate; the sync handler
/// only needs the resolution step.
pub trait TokenResolver: Send + Sync {
    /// Resolves a bearer token, or rejects the request.
    fn resolve(&self, token: &str) -> ServerResult<UserId>;
}

/// An in-memory token table, for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryTokenResolver {
    tokens: RwLock<HashMap<String, UserId>>,
}

impl MemoryTokenResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a user, replacing any previous binding.
    pub fn register(&self, token: impl Into<String>, user: UserId) {
        self.tokens.write().insert(token.into(), user);
    }

    /// Revokes a token.
    pub fn revoke(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

impl TokenResolver for MemoryTokenResolver {
    fn resolve(&self, token: &str) -> ServerResult<UserId> {
        self.tokens
            .read()
            .get(token)
            .copied()
            .ok_or_else(|| ServerError::unauthorized("unknown token"))
    }
}
