//! Cursor-based delta scans over the authoritative store.

use crate::store::{ServerStore, UserId};
use stapel_core::{Replicated, Timestamp};
use stapel_sync_protocol::ChangeSet;

/// Collects everything a user's replica is missing past its cursor.
///
/// A `None` cursor means "never synced" and scans from the epoch, so a
/// fresh device receives the full collection. Rows are classified by
/// their post-reconciliation state:
/// - tombstoned rows touched since the cursor report only their id
/// - rows created since the cursor are `created`
/// - rows that predate the cursor but changed since are `updated`
///
/// A row created before the cursor on another device but first uploaded
/// after it classifies as `updated`; receivers insert missing rows on
/// update anyway, so the mislabel is benign.
pub fn changes_since<T: Replicated>(
    store: &ServerStore<T>,
    user: UserId,
    since: Option<Timestamp>,
) -> ChangeSet<T> {
    let floor = since.unwrap_or(chrono::DateTime::UNIX_EPOCH);
    let mut set = ChangeSet::default();

    for row in store.rows_for_user(user) {
        if row.is_deleted() {
            if row.updated_at() > floor {
                set.deleted.push(row.id());
            }
        } else if row.updated_at() > floor {
            if row.created_at() > floor {
                set.created.push(row);
            } else {
                set.updated.push(row);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stapel_core::{LogSize, Rack};

    fn ts(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rack_at(name: &str, created: i64) -> Rack {
        Rack::new(name, 180.0, 200.0, 33.0, LogSize::Cm33, 1.19, 1.66, ts(created))
    }

    #[test]
    fn no_cursor_returns_the_full_collection() {
        let store = ServerStore::new();
        let user = UserId::new();
        store.put(user, rack_at("a", 100)).unwrap();
        store.put(user, rack_at("b", 200)).unwrap();

        let set = changes_since(&store, user, None);
        assert_eq!(set.created.len(), 2);
        assert!(set.updated.is_empty());
        assert!(set.deleted.is_empty());
    }

    #[test]
    fn rows_behind_the_cursor_are_omitted() {
        let store = ServerStore::new();
        let user = UserId::new();
        store.put(user, rack_at("old", 100)).unwrap();
        store.put(user, rack_at("new", 300)).unwrap();

        let set = changes_since(&store, user, Some(ts(200)));
        assert_eq!(set.created.len(), 1);
        assert_eq!(set.created[0].name, "new");
        assert!(set.updated.is_empty());
        assert!(set.deleted.is_empty());
    }

    #[test]
    fn old_row_mutated_after_cursor_classifies_as_updated() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack_at("old", 100);
        row.set_updated_at(ts(300));
        store.put(user, row).unwrap();

        let set = changes_since(&store, user, Some(ts(200)));
        assert!(set.created.is_empty());
        assert_eq!(set.updated.len(), 1);
    }

    #[test]
    fn tombstones_report_only_their_id() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack_at("gone", 100);
        row.tombstone(ts(300));
        store.put(user, row.clone()).unwrap();

        let set = changes_since(&store, user, Some(ts(200)));
        assert!(set.created.is_empty());
        assert!(set.updated.is_empty());
        assert_eq!(set.deleted, vec![row.id]);

        // A replica already past the deletion hears nothing.
        let set = changes_since(&store, user, Some(ts(400)));
        assert!(set.is_empty());
    }

    #[test]
    fn deltas_are_scoped_per_user() {
        let store = ServerStore::new();
        let alice = UserId::new();
        let bob = UserId::new();
        store.put(alice, rack_at("private", 100)).unwrap();

        assert!(changes_since(&store, bob, None).is_empty());
    }
}
