//! Conflict records and last-write-wins arbitration.

use serde::{Deserialize, Serialize};
use stapel_core::{ConsumptionEntry, EntityId, EntityKind, Rack, Replicated, Timestamp};

/// Which side of a conflict holds the authoritative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictWinner {
    /// The incoming client write wins.
    Local,
    /// The server's existing row wins.
    Server,
}

/// Last-write-wins arbitration between an incoming write and the
/// authoritative row.
///
/// The incoming write wins on ties. This is a pure wall-clock policy:
/// two truly concurrent edits silently pick one side, which is an
/// accepted limitation of the protocol, not a bug.
pub fn resolve(local_updated_at: Timestamp, server_updated_at: Timestamp) -> ConflictWinner {
    if local_updated_at >= server_updated_at {
        ConflictWinner::Local
    } else {
        ConflictWinner::Server
    }
}

/// The authoritative row attached to a conflict, either entity kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityPayload {
    /// A rack row.
    Rack(Rack),
    /// A consumption row.
    Consumption(ConsumptionEntry),
}

impl EntityPayload {
    /// Returns the rack row, if this payload is one.
    pub fn into_rack(self) -> Option<Rack> {
        match self {
            EntityPayload::Rack(rack) => Some(rack),
            EntityPayload::Consumption(_) => None,
        }
    }

    /// Returns the consumption row, if this payload is one.
    pub fn into_consumption(self) -> Option<ConsumptionEntry> {
        match self {
            EntityPayload::Consumption(entry) => Some(entry),
            EntityPayload::Rack(_) => None,
        }
    }
}

impl From<Rack> for EntityPayload {
    fn from(rack: Rack) -> Self {
        EntityPayload::Rack(rack)
    }
}

impl From<ConsumptionEntry> for EntityPayload {
    fn from(entry: ConsumptionEntry) -> Self {
        EntityPayload::Consumption(entry)
    }
}

/// Report of a queue item that lost arbitration.
///
/// Not an error and never persisted as its own entity: it tells the
/// client to overwrite its stale row with `resolved_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Which collection the entity belongs to.
    pub entity_type: EntityKind,
    /// The contested entity.
    pub entity_id: EntityId,
    /// Which side won.
    pub winner: ConflictWinner,
    /// The value the client must adopt.
    pub resolved_data: EntityPayload,
}

impl ConflictRecord {
    /// Builds the record for a server-side win, carrying the
    /// authoritative row.
    pub fn server_wins<T>(row: T) -> Self
    where
        T: Replicated + Into<EntityPayload>,
    {
        Self {
            entity_type: T::KIND,
            entity_id: row.id(),
            winner: ConflictWinner::Server,
            resolved_data: row.into(),
        }
    }
}
