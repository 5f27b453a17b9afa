//! # Stapel Core
//!
//! Entity model and storage interfaces for the stapel firewood tracker.
//!
//! This crate provides:
//! - The two replicated entity kinds (`Rack`, `ConsumptionEntry`)
//! - The replication envelope (`Replicated` trait, `SyncStatus`)
//! - The narrow `EntityStore` interface the sync layer depends on
//! - Lenient wire-value coercion helpers
//!
//! This is a pure data-model crate with no I/O operations. Durable
//! storage engines plug in behind `EntityStore`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod coerce;
mod entity;
mod error;
mod store;
mod types;

pub use entity::{
    validate_envelope, ConsumptionEntry, ConsumptionKind, EntityId, LogSize, Rack, Replicated,
    SyncStatus,
};
pub use error::{CoreError, CoreResult};
pub use store::{EntityStore, MemoryStore};
pub use types::{now, EntityKind, Timestamp};
