//! Protocol messages for the sync exchange.

use crate::conflict::ConflictRecord;
use serde::{Deserialize, Serialize};
use stapel_core::{coerce, ConsumptionEntry, EntityId, Rack, Replicated, Timestamp};

/// The net operation a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// The entity was created locally and the server has never seen it.
    Create,
    /// The entity existed before and was mutated.
    Update,
    /// The entity was deleted locally.
    Delete,
}

/// One pending local mutation, shipped with the snapshot taken at
/// enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem<T> {
    /// Snapshot of the entity when the change was queued.
    pub data: T,
    /// The net operation.
    pub action: ChangeAction,
    /// The snapshot's `updatedAt`, used for conflict arbitration.
    #[serde(deserialize_with = "coerce::timestamp")]
    pub local_updated_at: Timestamp,
}

impl<T: Replicated> SyncItem<T> {
    /// Wraps a snapshot, tagging it with its own `updatedAt`.
    pub fn new(data: T, action: ChangeAction) -> Self {
        let local_updated_at = data.updated_at();
        Self {
            data,
            action,
            local_updated_at,
        }
    }
}

/// The full client upload: cursor plus the drained change queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Watermark below which the caller already reflects all server
    /// state; `None` means the caller has never synced.
    #[serde(default, deserialize_with = "coerce::timestamp_opt")]
    pub last_sync_timestamp: Option<Timestamp>,
    /// Pending rack changes.
    pub racks: Vec<SyncItem<Rack>>,
    /// Pending consumption changes.
    pub consumptions: Vec<SyncItem<ConsumptionEntry>>,
}

impl SyncRequest {
    /// Returns true if the request uploads no changes.
    pub fn is_empty(&self) -> bool {
        self.racks.is_empty() && self.consumptions.is_empty()
    }
}

/// Server-side changes for one entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet<T> {
    /// Rows the caller has not seen before.
    pub created: Vec<T>,
    /// Rows that existed before the caller's cursor but changed since.
    pub updated: Vec<T>,
    /// Ids of tombstoned rows.
    pub deleted: Vec<EntityId>,
}

// Manual impl: `derive(Default)` would require `T: Default`.
impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T> ChangeSet<T> {
    /// Returns true if the change set carries nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of entries across all three buckets.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

impl<T: Replicated> ChangeSet<T> {
    /// Merges `other` into `self`, deduplicating by entity id per bucket.
    ///
    /// Rows reconciled in the current round also show up in the delta
    /// scan; clients apply idempotently, so residual cross-bucket overlap
    /// is harmless.
    pub fn merge(&mut self, other: ChangeSet<T>) {
        for row in other.created {
            if !self.created.iter().any(|r| r.id() == row.id()) {
                self.created.push(row);
            }
        }
        for row in other.updated {
            if !self.updated.iter().any(|r| r.id() == row.id()) {
                self.updated.push(row);
            }
        }
        for id in other.deleted {
            if !self.deleted.contains(&id) {
                self.deleted.push(id);
            }
        }
    }
}

/// The full server reply: applied results merged with deltas since the
/// caller's cursor, plus any lost arbitrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// The server time of this round; becomes the caller's new cursor.
    #[serde(deserialize_with = "coerce::timestamp")]
    pub server_timestamp: Timestamp,
    /// Rack changes to apply locally.
    pub racks: ChangeSet<Rack>,
    /// Consumption changes to apply locally.
    pub consumptions: ChangeSet<ConsumptionEntry>,
    /// Queue items that lost arbitration, with the authoritative rows.
    pub conflicts: Vec<ConflictRecord>,
}
