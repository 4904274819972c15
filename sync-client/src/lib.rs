//! # roomsync-client
//!
//! Client library for the roomsync offline-first sync protocol.
//!
//! This is the main library that applications embed to read and write
//! synced rooms.
//!
//! ## Features
//!
//! - **Offline First**: updates are durable and locally visible before any
//!   connection exists
//! - **Transactional Store**: one inbound frame or local write is one
//!   transaction, over a pluggable key-value backend
//! - **Cumulative Confirmations**: unconfirmed updates are resent until the
//!   host's confirmed offset covers them
//! - **Transport Abstraction**: pluggable transport layer (WebSocket, mock)
//!
//! ## Example
//!
//! ```ignore
//! use roomsync_client::{ClientConfig, MemoryStore, SyncClient, WebSocketTransport};
//!
//! let client = SyncClient::new(
//!     ClientConfig::new("ws://localhost:9090"),
//!     MemoryStore::new(),
//!     WebSocketTransport::new(),
//! );
//!
//! // Durable immediately, synced later.
//! client.update("notes", b"my data").await?;
//! client.connect().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
mod session;
pub mod store;
pub mod transport;

pub use client::{ConnectionStatus, Subscription, SyncClient};
pub use config::ClientConfig;
pub use error::{ClientError, ProtocolViolation};
pub use fanout::{Fanout, RoomEvent};
pub use store::{MemoryStore, RoomMeta, RoomTxn, StoreBackend, StoreError, StoreTxn};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};
