//! Replicated entity model.

mod consumption;
mod id;
mod rack;

pub use consumption::{ConsumptionEntry, ConsumptionKind};
pub use id::EntityId;
pub use rack::{LogSize, Rack};

use crate::error::{CoreError, CoreResult};
use crate::types::{EntityKind, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Local replication bookkeeping for an entity.
///
/// This is never sent to nor trusted from the peer; entities arriving off
/// the wire default to [`SyncStatus::Synced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// The local row matches the last known server state.
    #[default]
    Synced,
    /// The local row has mutations awaiting upload.
    Pending,
    /// The local row lost arbitration and was overwritten by the server.
    Conflict,
}

/// Capability surface of the replication envelope.
///
/// Both entity kinds carry the same envelope: a client-generated id that is
/// never reused, creation and mutation timestamps, an optional tombstone,
/// and local-only sync bookkeeping. All sync components are generic over
/// this trait so they never touch domain fields.
pub trait Replicated:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind tag used in protocol envelopes.
    const KIND: EntityKind;

    /// Stable primary key, immutable for the lifetime of the entity.
    fn id(&self) -> EntityId;

    /// Immutable creation time.
    fn created_at(&self) -> Timestamp;

    /// Time of the last mutation; authoritative for conflict ordering.
    fn updated_at(&self) -> Timestamp;

    /// Sets the last mutation time.
    fn set_updated_at(&mut self, at: Timestamp);

    /// Tombstone marker; `Some` means logically deleted.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Sets or clears the tombstone marker.
    fn set_deleted_at(&mut self, at: Option<Timestamp>);

    /// Local sync bookkeeping.
    fn sync_status(&self) -> SyncStatus;

    /// Sets the local sync bookkeeping.
    fn set_sync_status(&mut self, status: SyncStatus);

    /// Returns true if the entity carries a tombstone.
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Tombstones the entity at `at`.
    ///
    /// Stamps `updated_at` as well so the deletion participates in
    /// last-write-wins ordering. Tombstoned entities are terminal; only
    /// physical purge or a new id can follow.
    fn tombstone(&mut self, at: Timestamp) {
        self.set_deleted_at(Some(at));
        self.set_updated_at(at);
    }
}

/// Validates the replication envelope invariants of an entity.
///
/// A tombstone, when present, must not precede the creation time nor the
/// last mutation time recorded alongside it.
pub fn validate_envelope<T: Replicated>(entity: &T) -> CoreResult<()> {
    if let Some(deleted_at) = entity.deleted_at() {
        if deleted_at < entity.created_at() {
            return Err(CoreError::invalid_envelope(
                entity.id(),
                "deletedAt precedes createdAt",
            ));
        }
        if deleted_at > entity.updated_at() {
            return Err(CoreError::invalid_envelope(
                entity.id(),
                "deletedAt is newer than updatedAt",
            ));
        }
    }
    Ok(())
}
