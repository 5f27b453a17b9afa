//! The sync endpoint: one request in, one response out.

use crate::auth::TokenResolver;
use crate::delta::changes_since;
use crate::error::ServerResult;
use crate::reconcile::reconcile;
use crate::store::{ServerStore, UserId};
use parking_lot::{Mutex, RwLock};
use stapel_core::{now, ConsumptionEntry, Rack, Timestamp};
use stapel_sync_protocol::{SyncRequest, SyncResponse};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Serves sync rounds over the authoritative stores.
///
/// Rounds for the same user are serialized with a per-user lock so two
/// devices syncing at once cannot interleave reconciliation and delta
/// scans. Rounds for different users only share the store locks.
pub struct SyncHandler {
    resolver: Arc<dyn TokenResolver>,
    racks: ServerStore<Rack>,
    consumptions: ServerStore<ConsumptionEntry>,
    round_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
    sync_marks: RwLock<HashMap<UserId, Timestamp>>,
}

impl SyncHandler {
    /// Creates a handler with empty stores.
    pub fn new(resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            resolver,
            racks: ServerStore::new(),
            consumptions: ServerStore::new(),
            round_locks: Mutex::new(HashMap::new()),
            sync_marks: RwLock::new(HashMap::new()),
        }
    }

    /// The authoritative rack store.
    pub fn racks(&self) -> &ServerStore<Rack> {
        &self.racks
    }

    /// The authoritative consumption store.
    pub fn consumptions(&self) -> &ServerStore<ConsumptionEntry> {
        &self.consumptions
    }

    /// When the user last completed a round, if ever.
    pub fn last_sync_for(&self, user: UserId) -> Option<Timestamp> {
        self.sync_marks.read().get(&user).copied()
    }

    /// Resolves the bearer token and runs one sync round.
    pub fn handle(&self, token: &str, request: &SyncRequest) -> ServerResult<SyncResponse> {
        let user = self.resolver.resolve(token)?;
        self.handle_sync(user, request)
    }

    /// Runs one sync round for an already-authenticated user.
    ///
    /// Reconciles the uploaded items first, then scans for deltas past
    /// the caller's cursor, so the response reflects the round's own
    /// accepted writes. The returned `server_timestamp` is taken before
    /// reconciliation and stamps every write of the round.
    pub fn handle_sync(&self, user: UserId, request: &SyncRequest) -> ServerResult<SyncResponse> {
        let round_lock = self.round_lock(user);
        let _round = round_lock.lock();

        let server_timestamp = now();

        let rack_outcome = reconcile(&self.racks, user, &request.racks, server_timestamp)?;
        let entry_outcome =
            reconcile(&self.consumptions, user, &request.consumptions, server_timestamp)?;
        let accepted = rack_outcome.stats.accepted() + entry_outcome.stats.accepted();
        let mut conflicts = rack_outcome.conflicts;
        conflicts.extend(entry_outcome.conflicts);

        // The delta scan already sees this round's writes; merging the
        // reconcile results on top covers rows whose client-side clocks
        // lag behind the caller's cursor.
        let mut racks = changes_since(&self.racks, user, request.last_sync_timestamp);
        racks.merge(rack_outcome.changes);
        let mut consumptions =
            changes_since(&self.consumptions, user, request.last_sync_timestamp);
        consumptions.merge(entry_outcome.changes);

        self.sync_marks.write().insert(user, server_timestamp);
        info!(
            %user,
            accepted,
            conflicts = conflicts.len(),
            racks_out = racks.len(),
            consumptions_out = consumptions.len(),
            "sync round served"
        );

        Ok(SyncResponse {
            server_timestamp,
            racks,
            consumptions,
            conflicts,
        })
    }

    fn round_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.round_locks.lock().entry(user).or_default())
    }
}
