//! # Stapel Sync Server
//!
//! Server half of the Stapel replication protocol.
//!
//! This crate provides:
//! - Per-user authoritative entity stores with retained tombstones
//! - Last-write-wins reconciliation of uploaded client changes
//! - Cursor-based delta scans
//! - Bearer-token resolution at the endpoint boundary
//!
//! ## Protocol
//!
//! The server answers one request shape: the client's cursor plus its
//! drained change queue. A round reconciles the uploads first, then
//! collects every change past the cursor from the post-reconciliation
//! state, so the reply both confirms the round's accepted writes and
//! carries what other devices did in the meantime.
//!
//! ## Key Invariants
//!
//! - Tombstones are terminal and never purged by reconciliation
//! - Replaying a request converges to the same server state
//! - Rounds for one user are serialized; users never share rows

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod delta;
mod error;
mod handler;
mod reconcile;
mod store;

pub use auth::{MemoryTokenResolver, TokenResolver};
pub use delta::changes_since;
pub use error::{ServerError, ServerResult};
pub use handler::SyncHandler;
pub use reconcile::{reconcile, ReconcileOutcome, ReconcileStats};
pub use store::{ServerStore, UserId};
