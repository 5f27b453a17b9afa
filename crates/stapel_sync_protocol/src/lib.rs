//! # Stapel Sync Protocol
//!
//! Wire contract shared by the sync client and the sync server.
//!
//! This crate provides:
//! - The request/response messages of the single sync exchange
//! - Per-entity change sets with id-deduplicating merge
//! - Conflict records and the last-write-wins resolver
//!
//! This is a pure protocol crate with no I/O operations. Messages are
//! JSON-shaped with camelCase field names; the actual encoding is left
//! to the transport.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod messages;

pub use conflict::{resolve, ConflictRecord, ConflictWinner, EntityPayload};
pub use messages::{ChangeAction, ChangeSet, SyncItem, SyncRequest, SyncResponse};
