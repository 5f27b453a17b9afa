//! Idempotent application of server changes to the local replica.

use crate::error::SyncResult;
use stapel_core::{
    ConsumptionEntry, EntityStore, Rack, Replicated, SyncStatus,
};
use stapel_sync_protocol::{ChangeSet, ConflictRecord, EntityPayload, SyncResponse};
use tracing::{debug, warn};

/// How many rows one apply pass touched, per bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    /// Rows newly inserted.
    pub created: usize,
    /// Rows overwritten.
    pub updated: usize,
    /// Rows physically removed.
    pub deleted: usize,
}

impl AppliedCounts {
    /// Total rows touched.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn add(&mut self, other: AppliedCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

/// Applies one entity kind's change set to its local store.
///
/// The rules make replays harmless:
/// - `created`: insert only if the id is absent
/// - `updated`: unconditional put, the server is authoritative
/// - `deleted`: hard remove; the client does not keep tombstones once
///   the deletion is confirmed
pub fn apply_change_set<T: Replicated>(
    store: &dyn EntityStore<T>,
    changes: &ChangeSet<T>,
) -> SyncResult<AppliedCounts> {
    let mut counts = AppliedCounts::default();

    for row in &changes.created {
        if store.contains(row.id())? {
            continue;
        }
        let mut row = row.clone();
        row.set_sync_status(SyncStatus::Synced);
        store.put(row)?;
        counts.created += 1;
    }

    for row in &changes.updated {
        let mut row = row.clone();
        row.set_sync_status(SyncStatus::Synced);
        store.put(row)?;
        counts.updated += 1;
    }

    for id in &changes.deleted {
        store.delete(*id)?;
        counts.deleted += 1;
    }

    Ok(counts)
}

/// Applies lost arbitrations by adopting each conflict's authoritative
/// row.
pub fn apply_conflicts(
    racks: &dyn EntityStore<Rack>,
    consumptions: &dyn EntityStore<ConsumptionEntry>,
    conflicts: &[ConflictRecord],
) -> SyncResult<()> {
    for conflict in conflicts {
        debug!(
            entity_type = %conflict.entity_type,
            entity_id = %conflict.entity_id,
            "adopting authoritative row after lost arbitration"
        );
        match conflict.resolved_data.clone() {
            EntityPayload::Rack(mut rack) => {
                rack.set_sync_status(SyncStatus::Synced);
                racks.put(rack)?;
            }
            EntityPayload::Consumption(mut entry) => {
                entry.set_sync_status(SyncStatus::Synced);
                consumptions.put(entry)?;
            }
        }
    }
    Ok(())
}

/// Applies a full server reply to the local replica.
///
/// Both entity kinds' change sets and the conflicts are applied as one
/// logical unit; every step is idempotent, so a fault mid-apply is
/// recovered by re-running the round (the cursor only advances after
/// the whole apply succeeded).
pub fn apply_response(
    racks: &dyn EntityStore<Rack>,
    consumptions: &dyn EntityStore<ConsumptionEntry>,
    response: &SyncResponse,
) -> SyncResult<AppliedCounts> {
    let mut counts = apply_change_set(racks, &response.racks)?;
    counts.add(apply_change_set(consumptions, &response.consumptions)?);
    apply_conflicts(racks, consumptions, &response.conflicts)?;

    if !response.conflicts.is_empty() {
        warn!(
            conflicts = response.conflicts.len(),
            "local writes lost arbitration and were overwritten"
        );
    }
    Ok(counts)
}
