//! # sync-wire
//!
//! Wire format for the roomsync protocol.
//!
//! This crate provides the foundational types used across all roomsync
//! crates:
//! - [`RoomName`], [`Offset`], [`RoomEpoch`] - Identity and ordering types
//! - [`Message`], [`MessageTag`] - The four protocol messages and their codec
//! - [`Reader`], [`Writer`] - Varint buffer primitives
//! - [`WireError`] - Codec error type
//!
//! Frames are concatenations of encoded messages with no outer length
//! header; [`encode_frame`] and [`decode_frame`] work at that granularity.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod message;
mod varint;

pub use error::WireError;
pub use ids::{Offset, RoomEpoch, RoomName};
pub use message::{decode_frame, encode_frame, Message, MessageTag, SubscriptionEntry};
pub use varint::{Reader, Writer};
