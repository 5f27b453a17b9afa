//! Consumption entry entity.

use crate::coerce;
use crate::entity::{EntityId, Replicated, SyncStatus};
use crate::types::{EntityKind, Timestamp};
use serde::{Deserialize, Serialize};

/// Whether an entry records wood being taken out or the rack being refilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionKind {
    /// The rack was refilled; `percentage` is the new fill level.
    Reload,
    /// Wood was consumed; `percentage` is the share taken out.
    Consumption,
}

/// A consumption or reload entry against a rack.
///
/// Week number and year are derived from `date` by external ISO-week
/// helpers at edit time; this crate only replicates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionEntry {
    /// Stable client-generated id.
    pub id: EntityId,
    /// The rack this entry belongs to.
    pub rack_id: EntityId,
    /// Reload or consumption.
    #[serde(rename = "type")]
    pub kind: ConsumptionKind,
    /// Fill level or consumed share, 0-100.
    #[serde(deserialize_with = "coerce::float")]
    pub percentage: f64,
    /// When the consumption happened.
    #[serde(deserialize_with = "coerce::timestamp")]
    pub date: Timestamp,
    /// ISO week of `date`, 1-53.
    #[serde(deserialize_with = "coerce::uint")]
    pub week_number: u32,
    /// ISO week-year of `date`.
    #[serde(deserialize_with = "coerce::int")]
    pub year: i32,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Immutable creation time.
    #[serde(deserialize_with = "coerce::timestamp")]
    pub created_at: Timestamp,
    /// Last mutation time.
    #[serde(deserialize_with = "coerce::timestamp")]
    pub updated_at: Timestamp,
    /// Tombstone marker.
    #[serde(default, deserialize_with = "coerce::timestamp_opt")]
    pub deleted_at: Option<Timestamp>,
    /// Local bookkeeping, never sent to or trusted from the peer.
    #[serde(skip)]
    pub sync_status: SyncStatus,
}

impl ConsumptionEntry {
    /// Creates a new entry with a fresh id, marked pending upload.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        rack_id: EntityId,
        kind: ConsumptionKind,
        percentage: f64,
        date: Timestamp,
        week_number: u32,
        year: i32,
        notes: Option<String>,
        at: Timestamp,
    ) -> Self {
        Self {
            id: EntityId::new(),
            rack_id,
            kind,
            percentage,
            date,
            week_number,
            year,
            notes,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
        }
    }
}

impl Replicated for ConsumptionEntry {
    const KIND: EntityKind = EntityKind::Consumption;

    fn id(&self) -> EntityId {
        self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: Timestamp) {
        self.updated_at = at;
    }

    fn deleted_at(&self) -> Option<Timestamp> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<Timestamp>) {
        self.deleted_at = at;
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}
