//! Durable change queue with per-entity coalescing.

use stapel_core::{now, ConsumptionEntry, EntityId, EntityKind, Rack, Timestamp};
use stapel_sync_protocol::ChangeAction;

/// A snapshot of a locally mutated entity, either kind.
#[derive(Debug, Clone)]
pub enum LocalChange {
    /// A rack snapshot.
    Rack(Rack),
    /// A consumption snapshot.
    Consumption(ConsumptionEntry),
}

impl LocalChange {
    /// The kind of the snapshotted entity.
    pub fn kind(&self) -> EntityKind {
        match self {
            LocalChange::Rack(_) => EntityKind::Rack,
            LocalChange::Consumption(_) => EntityKind::Consumption,
        }
    }

    /// The snapshotted entity's id.
    pub fn id(&self) -> EntityId {
        match self {
            LocalChange::Rack(rack) => rack.id,
            LocalChange::Consumption(entry) => entry.id,
        }
    }
}

impl From<Rack> for LocalChange {
    fn from(rack: Rack) -> Self {
        LocalChange::Rack(rack)
    }
}

impl From<ConsumptionEntry> for LocalChange {
    fn from(entry: ConsumptionEntry) -> Self {
        LocalChange::Consumption(entry)
    }
}

/// One queued mutation awaiting upload.
///
/// There is at most one item per (kind, id) at any time; later local
/// mutations coalesce into it.
#[derive(Debug, Clone)]
pub struct ChangeQueueItem {
    /// Kind of the mutated entity.
    pub entity_kind: EntityKind,
    /// Id of the mutated entity.
    pub entity_id: EntityId,
    /// The net operation to ship.
    pub action: ChangeAction,
    /// Snapshot of the entity at (last) enqueue time.
    pub data: LocalChange,
    /// When the item was (last) queued.
    pub enqueued_at: Timestamp,
}

/// Ordered log of local mutations awaiting upload.
///
/// Coalescing guarantees at most one network-visible operation per
/// entity per round, always carrying the latest local value:
/// - create then delete annihilates (the server never saw the entity)
/// - create then update stays a create with the newer snapshot
/// - anything else takes the newer action, with delete dominating
#[derive(Debug, Default)]
pub struct ChangeQueue {
    items: Vec<ChangeQueueItem>,
}

impl ChangeQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records a local mutation, coalescing with any pending item for
    /// the same entity.
    pub fn enqueue(&mut self, action: ChangeAction, data: impl Into<LocalChange>) {
        let data = data.into();
        let kind = data.kind();
        let id = data.id();

        let Some(pos) = self
            .items
            .iter()
            .position(|item| item.entity_kind == kind && item.entity_id == id)
        else {
            self.items.push(ChangeQueueItem {
                entity_kind: kind,
                entity_id: id,
                action,
                data,
                enqueued_at: now(),
            });
            return;
        };

        let existing = &mut self.items[pos];
        match (existing.action, action) {
            // Never synced the creation; no need to report a deletion of
            // something the server never saw.
            (ChangeAction::Create, ChangeAction::Delete) => {
                self.items.remove(pos);
            }
            (ChangeAction::Create, _) => {
                existing.data = data;
                existing.enqueued_at = now();
            }
            (_, ChangeAction::Delete) => {
                existing.action = ChangeAction::Delete;
                existing.data = data;
                existing.enqueued_at = now();
            }
            (_, _) => {
                existing.action = ChangeAction::Update;
                existing.data = data;
                existing.enqueued_at = now();
            }
        }
    }

    /// Returns the pending items in enqueue order.
    ///
    /// Items stay queued until [`acknowledge`](Self::acknowledge); the
    /// round that uploads them only acknowledges once the server reply
    /// has been fully applied, keeping a failed round retryable.
    pub fn drain(&self) -> Vec<ChangeQueueItem> {
        self.items.clone()
    }

    /// Removes previously drained items after a successful upload.
    ///
    /// An entry is removed only if it is unchanged since the drain; a
    /// mutation that arrived mid-round refreshed `enqueued_at` and the
    /// entry stays for the next round.
    pub fn acknowledge(&mut self, drained: &[ChangeQueueItem]) {
        self.items.retain(|item| {
            !drained.iter().any(|d| {
                d.entity_kind == item.entity_kind
                    && d.entity_id == item.entity_id
                    && d.enqueued_at == item.enqueued_at
            })
        });
    }

    /// Returns the pending item for an entity, if any.
    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<&ChangeQueueItem> {
        self.items
            .iter()
            .find(|item| item.entity_kind == kind && item.entity_id == id)
    }

    /// Removes all pending items.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
