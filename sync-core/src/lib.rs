//! # sync-core
//!
//! Pure reconciliation logic for roomsync (no I/O, instant tests).
//!
//! This crate implements the per-room state machine of the sync protocol
//! without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce
//! output without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (store transactions, wire traffic, fan-out) is performed
//! by `sync-client`, which feeds decoded messages and persisted mutations
//! into the [`Reconciler`] and sends what it answers with.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pending;
pub mod reconcile;
pub mod room;

pub use pending::{PendingQueue, PendingUpdate, QueueError};
pub use reconcile::Reconciler;
pub use room::{ConfirmOutcome, RoomState, SubscriptionOutcome, SubscriptionState};
