//! Arbitration of uploaded client changes against authoritative rows.

use crate::error::ServerResult;
use crate::store::{ServerStore, UserId};
use stapel_core::{Replicated, Timestamp};
use stapel_sync_protocol::{
    resolve, ChangeAction, ChangeSet, ConflictRecord, ConflictWinner, EntityPayload, SyncItem,
};
use tracing::{debug, trace, warn};

/// How one reconciliation pass handled its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// New rows inserted.
    pub created: usize,
    /// Rows overwritten by a winning client update.
    pub updated: usize,
    /// Rows tombstoned by a winning client delete.
    pub deleted: usize,
    /// Items dropped as replays or no-ops.
    pub ignored: usize,
}

impl ReconcileStats {
    /// Total items that changed server state.
    pub fn accepted(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// What one reconciliation pass did to the store.
#[derive(Debug)]
pub struct ReconcileOutcome<T> {
    /// The accepted writes as stored, shaped for merging into the
    /// response deltas.
    pub changes: ChangeSet<T>,
    /// Item disposition counts.
    pub stats: ReconcileStats,
    /// Items that lost arbitration, with the authoritative rows.
    pub conflicts: Vec<ConflictRecord>,
}

impl<T> Default for ReconcileOutcome<T> {
    fn default() -> Self {
        Self {
            changes: ChangeSet::default(),
            stats: ReconcileStats::default(),
            conflicts: Vec::new(),
        }
    }
}

/// Reconciles one entity kind's uploaded items into the store.
///
/// - `create`: insert the snapshot verbatim; a replay of an id the
///   store already holds is dropped, never arbitrated
/// - `update`: last-write-wins against the stored row; a winning write
///   adopts the snapshot but keeps any existing tombstone and is
///   stamped with `server_timestamp`
/// - `delete`: last-write-wins; a winning delete tombstones the row
///
/// Updates and deletes for rows the store has never seen are no-ops:
/// the row was deleted by another device, and recreating it here would
/// resurrect it.
///
/// Item failures never fail the pass. A snapshot with a broken envelope
/// is dropped as `ignored`; the other items of the round still land.
/// Timestamps written by the pass are clamped against `created_at`, so
/// a row created under a client clock running ahead of the server can
/// still be tombstoned.
pub fn reconcile<T>(
    store: &ServerStore<T>,
    user: UserId,
    items: &[SyncItem<T>],
    server_timestamp: Timestamp,
) -> ServerResult<ReconcileOutcome<T>>
where
    T: Replicated + Into<EntityPayload>,
{
    let mut outcome = ReconcileOutcome::default();

    for item in items {
        let id = item.data.id();
        match item.action {
            ChangeAction::Create => {
                if store.get(user, id).is_some() {
                    trace!(%id, "dropping replayed create");
                    outcome.stats.ignored += 1;
                    continue;
                }
                match store.put(user, item.data.clone()) {
                    Ok(()) => {
                        outcome.changes.created.push(item.data.clone());
                        outcome.stats.created += 1;
                    }
                    Err(error) => {
                        warn!(%id, %error, "dropping create with broken envelope");
                        outcome.stats.ignored += 1;
                    }
                }
            }
            ChangeAction::Update => {
                let Some(existing) = store.get(user, id) else {
                    trace!(%id, "dropping update for unknown row");
                    outcome.stats.ignored += 1;
                    continue;
                };
                match resolve(item.local_updated_at, existing.updated_at()) {
                    ConflictWinner::Local => {
                        let mut row = item.data.clone();
                        // A tombstone is terminal; a late update must not
                        // resurrect the row.
                        row.set_deleted_at(existing.deleted_at());
                        let stamp = existing
                            .deleted_at()
                            .map_or(server_timestamp, |at| at.max(server_timestamp));
                        row.set_updated_at(stamp);
                        match store.put(user, row.clone()) {
                            Ok(()) => {
                                outcome.changes.updated.push(row);
                                outcome.stats.updated += 1;
                            }
                            Err(error) => {
                                warn!(%id, %error, "dropping update with broken envelope");
                                outcome.stats.ignored += 1;
                            }
                        }
                    }
                    ConflictWinner::Server => {
                        debug!(%id, "update lost arbitration");
                        outcome.conflicts.push(ConflictRecord::server_wins(existing));
                        outcome.stats.ignored += 1;
                    }
                }
            }
            ChangeAction::Delete => {
                let Some(existing) = store.get(user, id) else {
                    trace!(%id, "dropping delete for unknown row");
                    outcome.stats.ignored += 1;
                    continue;
                };
                if existing.is_deleted() {
                    outcome.stats.ignored += 1;
                    continue;
                }
                match resolve(item.local_updated_at, existing.updated_at()) {
                    ConflictWinner::Local => {
                        let mut row = existing;
                        // Clamp so rows created ahead of server time keep
                        // a valid envelope.
                        row.tombstone(server_timestamp.max(row.created_at()));
                        match store.put(user, row) {
                            Ok(()) => {
                                outcome.changes.deleted.push(id);
                                outcome.stats.deleted += 1;
                            }
                            Err(error) => {
                                warn!(%id, %error, "dropping delete with broken envelope");
                                outcome.stats.ignored += 1;
                            }
                        }
                    }
                    ConflictWinner::Server => {
                        debug!(%id, "delete lost arbitration");
                        outcome.conflicts.push(ConflictRecord::server_wins(existing));
                        outcome.stats.ignored += 1;
                    }
                }
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stapel_core::{LogSize, Rack};
    use stapel_sync_protocol::SyncItem;

    fn ts(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn rack(name: &str) -> Rack {
        Rack::new(name, 180.0, 200.0, 33.0, LogSize::Cm33, 1.19, 1.66, ts(100))
    }

    #[test]
    fn create_inserts_and_replay_is_dropped() {
        let store = ServerStore::new();
        let user = UserId::new();
        let row = rack("shed");
        let items = vec![SyncItem::new(row.clone(), ChangeAction::Create)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.created, 1);
        assert_eq!(outcome.changes.created.len(), 1);
        assert!(outcome.conflicts.is_empty());

        let outcome = reconcile(&store, user, &items, ts(600)).unwrap();
        assert_eq!(outcome.stats.created, 0);
        assert_eq!(outcome.stats.ignored, 1);
        assert!(outcome.changes.is_empty());
        assert!(outcome.conflicts.is_empty());
        assert_eq!(store.get(user, row.id).unwrap().name, "shed");
    }

    #[test]
    fn newer_update_wins_and_is_stamped_with_server_time() {
        let store = ServerStore::new();
        let user = UserId::new();
        let row = rack("shed");
        store.put(user, row.clone()).unwrap();

        let mut edited = row.clone();
        edited.name = "terrace".into();
        edited.set_updated_at(ts(200));
        let items = vec![SyncItem::new(edited, ChangeAction::Update)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.updated, 1);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.changes.updated[0].updated_at, ts(500));

        let stored = store.get(user, row.id).unwrap();
        assert_eq!(stored.name, "terrace");
        assert_eq!(stored.updated_at, ts(500));
    }

    #[test]
    fn stale_update_loses_and_reports_authoritative_row() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack("server-side");
        row.set_updated_at(ts(300));
        store.put(user, row.clone()).unwrap();

        let mut stale = row.clone();
        stale.name = "stale".into();
        stale.set_updated_at(ts(200));
        let items = vec![SyncItem::new(stale, ChangeAction::Update)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.updated, 0);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].winner, ConflictWinner::Server);
        let resolved = outcome.conflicts[0].resolved_data.clone().into_rack().unwrap();
        assert_eq!(resolved.name, "server-side");
        // The stored row is untouched.
        assert_eq!(store.get(user, row.id).unwrap().name, "server-side");
    }

    #[test]
    fn tie_favors_the_incoming_write() {
        let store = ServerStore::new();
        let user = UserId::new();
        let row = rack("shed");
        store.put(user, row.clone()).unwrap();

        let mut edited = row.clone();
        edited.name = "tied".into();
        let items = vec![SyncItem::new(edited, ChangeAction::Update)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.updated, 1);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(store.get(user, row.id).unwrap().name, "tied");
    }

    #[test]
    fn update_for_unknown_row_is_a_noop() {
        let store: ServerStore<Rack> = ServerStore::new();
        let user = UserId::new();
        let items = vec![SyncItem::new(rack("ghost"), ChangeAction::Update)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.accepted(), 0);
        assert_eq!(outcome.stats.ignored, 1);
        assert!(outcome.conflicts.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn update_does_not_resurrect_a_tombstoned_row() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack("shed");
        row.tombstone(ts(150));
        store.put(user, row.clone()).unwrap();

        let mut edited = rack("irrelevant");
        edited.id = row.id;
        edited.set_updated_at(ts(400));
        let items = vec![SyncItem::new(edited, ChangeAction::Update)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.updated, 1);
        let stored = store.get(user, row.id).unwrap();
        assert!(stored.is_deleted());
        assert_eq!(stored.deleted_at, Some(ts(150)));
    }

    #[test]
    fn winning_delete_tombstones_the_row() {
        let store = ServerStore::new();
        let user = UserId::new();
        let row = rack("shed");
        store.put(user, row.clone()).unwrap();

        let mut snapshot = row.clone();
        snapshot.set_updated_at(ts(200));
        let items = vec![SyncItem::new(snapshot, ChangeAction::Delete)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.deleted, 1);
        assert_eq!(outcome.changes.deleted, vec![row.id]);
        assert!(outcome.conflicts.is_empty());

        let stored = store.get(user, row.id).unwrap();
        assert_eq!(stored.deleted_at, Some(ts(500)));
        assert_eq!(stored.updated_at, ts(500));

        // Replaying the delete changes nothing.
        let outcome = reconcile(&store, user, &items, ts(600)).unwrap();
        assert_eq!(outcome.stats.ignored, 1);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(store.get(user, row.id).unwrap().deleted_at, Some(ts(500)));
    }

    #[test]
    fn delete_of_a_row_created_ahead_of_server_time_still_lands() {
        let store = ServerStore::new();
        let user = UserId::new();
        // Created under a client clock running ahead of the server.
        let row = Rack::new("ahead", 180.0, 200.0, 33.0, LogSize::Cm33, 1.19, 1.66, ts(1_000));
        store.put(user, row.clone()).unwrap();

        let items = vec![SyncItem::new(row.clone(), ChangeAction::Delete)];
        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();

        assert_eq!(outcome.stats.deleted, 1);
        assert_eq!(outcome.changes.deleted, vec![row.id]);
        let stored = store.get(user, row.id).unwrap();
        // The tombstone is clamped to the creation time.
        assert_eq!(stored.deleted_at, Some(ts(1_000)));
        assert_eq!(stored.updated_at, ts(1_000));
    }

    #[test]
    fn broken_envelope_drops_the_item_not_the_pass() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut bad = rack("bad");
        bad.deleted_at = Some(ts(10));
        let good = rack("good");
        let items = vec![
            SyncItem::new(bad.clone(), ChangeAction::Create),
            SyncItem::new(good.clone(), ChangeAction::Create),
        ];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();

        assert_eq!(outcome.stats.created, 1);
        assert_eq!(outcome.stats.ignored, 1);
        assert!(outcome.conflicts.is_empty());
        assert!(store.get(user, bad.id).is_none());
        assert_eq!(store.get(user, good.id).unwrap().name, "good");
    }

    #[test]
    fn stale_delete_loses_arbitration() {
        let store = ServerStore::new();
        let user = UserId::new();
        let mut row = rack("shed");
        row.set_updated_at(ts(300));
        store.put(user, row.clone()).unwrap();

        let mut snapshot = row.clone();
        snapshot.set_updated_at(ts(200));
        let items = vec![SyncItem::new(snapshot, ChangeAction::Delete)];

        let outcome = reconcile(&store, user, &items, ts(500)).unwrap();
        assert_eq!(outcome.stats.deleted, 0);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(!store.get(user, row.id).unwrap().is_deleted());
    }
}
