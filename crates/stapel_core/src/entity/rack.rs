//! Firewood rack entity.

use crate::coerce;
use crate::entity::{EntityId, Replicated, SyncStatus};
use crate::types::{EntityKind, Timestamp};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Nominal log length stored in a rack, in centimeters.
///
/// Serialized as the bare number (25, 33 or 50); numeric strings are
/// accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSize {
    /// 25 cm logs.
    Cm25,
    /// 33 cm logs.
    Cm33,
    /// 50 cm logs.
    Cm50,
}

impl LogSize {
    /// Returns the length in centimeters.
    #[must_use]
    pub const fn as_cm(self) -> u8 {
        match self {
            LogSize::Cm25 => 25,
            LogSize::Cm33 => 33,
            LogSize::Cm50 => 50,
        }
    }

    /// Creates a log size from a length in centimeters.
    #[must_use]
    pub const fn from_cm(cm: u8) -> Option<Self> {
        match cm {
            25 => Some(LogSize::Cm25),
            33 => Some(LogSize::Cm33),
            50 => Some(LogSize::Cm50),
            _ => None,
        }
    }
}

impl Serialize for LogSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_cm())
    }
}

impl<'de> Deserialize<'de> for LogSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cm = coerce::uint(deserializer)?;
        u8::try_from(cm)
            .ok()
            .and_then(LogSize::from_cm)
            .ok_or_else(|| de::Error::custom(format!("unsupported log size: {cm}")))
    }
}

/// A firewood rack with its dimensions and precomputed volumes.
///
/// The volume fields are produced by external helpers at edit time; this
/// crate only replicates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rack {
    /// Stable client-generated id.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Height in cm.
    #[serde(deserialize_with = "coerce::float")]
    pub height: f64,
    /// Width in cm.
    #[serde(deserialize_with = "coerce::float")]
    pub width: f64,
    /// Depth in cm.
    #[serde(deserialize_with = "coerce::float")]
    pub depth: f64,
    /// Nominal log length.
    pub log_size: LogSize,
    /// Stacked volume in cubic meters.
    #[serde(deserialize_with = "coerce::float")]
    pub volume_m3: f64,
    /// Volume in steres.
    #[serde(deserialize_with = "coerce::float")]
    pub volume_steres: f64,
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

impl Rack {
    /// Creates a new rack with a fresh id, marked pending upload.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        height: f64,
        width: f64,
        depth: f64,
        log_size: LogSize,
        volume_m3: f64,
        volume_steres: f64,
        at: Timestamp,
    ) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            height,
            width,
            depth,
            log_size,
            volume_m3,
            volume_steres,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
        }
    }
}

impl Replicated for Rack {
    const KIND: EntityKind = EntityKind::Rack;

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
