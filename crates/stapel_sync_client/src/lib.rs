//! # Stapel Sync Client
//!
//! Client half of the Stapel replication protocol.
//!
//! This crate provides:
//! - Durable change queue with per-entity coalescing
//! - Single-flight sync client over a pluggable transport
//! - Idempotent application of server change sets and conflicts
//!
//! ## Architecture
//!
//! The client implements a **push-then-pull** round in one exchange:
//! 1. Drain the change queue into a [`SyncRequest`] alongside the cursor
//! 2. Send it over the [`SyncTransport`]
//! 3. Apply the reply's change sets and conflicts to the local stores
//! 4. Clear the queue and advance the cursor
//!
//! ## Key Invariants
//!
//! - A failed round leaves the queue and cursor untouched
//! - At most one round is in flight at a time
//! - Applying a server reply twice converges to the same state
//!
//! [`SyncRequest`]: stapel_sync_protocol::SyncRequest

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod client;
mod error;
mod queue;
mod transport;

pub use apply::{apply_change_set, apply_conflicts, apply_response, AppliedCounts};
pub use client::{ClientStatus, RoundReport, SkipReason, SyncClient, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use queue::{ChangeQueue, ChangeQueueItem, LocalChange};
pub use transport::{MockTransport, SyncTransport};
