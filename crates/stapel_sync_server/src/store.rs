//! Per-user server-side entity storage.

use parking_lot::RwLock;
use stapel_core::{validate_envelope, CoreResult, EntityId, Replicated};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifies the account whose rows a request may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(Uuid);

impl UserId {
    /// Generates a fresh random user id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authoritative storage for one entity kind, scoped by user.
///
/// Rows live under a `(user, id)` composite key; one user's rows are
/// invisible to every other user. Tombstoned rows are kept, not purged,
/// so deletions keep propagating to clients that have not synced yet.
#[derive(Debug)]
pub struct ServerStore<T: Replicated> {
    rows: RwLock<HashMap<(UserId, EntityId), T>>,
}

impl<T: Replicated> ServerStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches one row, tombstoned or not.
    pub fn get(&self, user: UserId, id: EntityId) -> Option<T> {
        self.rows.read().get(&(user, id)).cloned()
    }

    /// Inserts or replaces a row after validating its envelope.
    pub fn put(&self, user: UserId, row: T) -> CoreResult<()> {
        validate_envelope(&row)?;
        self.rows.write().insert((user, row.id()), row);
        Ok(())
    }

    /// All rows belonging to one user, in no particular order.
    pub fn rows_for_user(&self, user: UserId) -> Vec<T> {
        self.rows
            .read()
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Total row count across all users, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl<T: Replicated> Default for ServerStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stapel_core::{LogSize, Rack, Timestamp};

    fn ts(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rack(name: &str) -> Rack {
        Rack::new(name, 180.0, 200.0, 33.0, LogSize::Cm33, 1.19, 1.66, ts(100))
    }

    #[test]
    fn rows_are_scoped_by_user() {
        let store = ServerStore::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let row = rack("shed");

        store.put(alice, row.clone()).unwrap();

        assert!(store.get(alice, row.id).is_some());
        assert!(store.get(bob, row.id).is_none());
        assert_eq!(store.rows_for_user(bob).len(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_rejects_broken_envelope() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack("shed");
        row.set_deleted_at(Some(ts(50)));

        assert!(store.put(user, row).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn tombstoned_rows_are_retained() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack("shed");
        row.tombstone(ts(200));

        store.put(user, row.clone()).unwrap();
        assert!(store.get(user, row.id).unwrap().is_deleted());
    }
}
