//! Shared scalar types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp used throughout the replication layer.
///
/// Serialized as RFC 3339 on the wire. Conflict arbitration compares
/// these values directly, so reasonably synchronized clocks are assumed.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Returns the current wall-clock time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// The kind of a replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A firewood rack.
    Rack,
    /// A consumption or reload entry.
    Consumption,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Rack => write!(f, "rack"),
            EntityKind::Consumption => write!(f, "consumption"),
        }
    }
}
