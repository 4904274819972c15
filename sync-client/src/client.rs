//! SyncClient - the main interface for room synchronization.
//!
//! This module provides [`SyncClient`], the primary API for applications to
//! read, update, and observe rooms whether or not a connection is up.
//!
//! # Architecture
//!
//! ```text
//! Application → SyncClient → Store (durable, transactional)
//!                   ↓             ↑
//!              Session task → Transport → host
//!                   ↓
//!                Fanout → application subscribers
//! ```
//!
//! Local writes go to the store first and get their sequence numbers there;
//! the session forwards them whenever a connection exists. Inbound frames
//! are applied by the session task and fanned out only after they commit.
//! Every method takes `&self`, so one client can be shared across tasks.
//!
//! # Example
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
//! // Works offline; durable immediately.
//! let mut notes = client.subscribe("notes").await?;
//! client.update("notes", b"hello").await?;
//!
//! // Sync when a connection is available.
//! client.connect().await?;
//! while let Some(event) = notes.recv().await {
//!     // apply the event
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use sync_wire::{Offset, RoomName};
use tokio::sync::{broadcast, mpsc, watch, Mutex};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::fanout::{Fanout, RoomEvent};
use crate::session::{Command, Session};
use crate::store::{RoomMeta, RoomTxn, StoreBackend};
use crate::transport::Transport;

/// Commands buffered between client handles and the session task.
const COMMAND_BUFFER: usize = 64;

/// Whether a session is currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session; operations are local-only.
    Offline,
    /// A session task owns a connection to the host.
    Connected,
}

/// The main sync client.
///
/// Owns the store, the fan-out registry, and at most one live session.
pub struct SyncClient<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    store: Arc<dyn StoreBackend>,
    fanout: Fanout,
    interest: Mutex<BTreeSet<RoomName>>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    status: watch::Sender<ConnectionStatus>,
    write_lock: Mutex<()>,
}

impl<T: Transport + 'static> SyncClient<T> {
    /// Create a client over `store` and `transport`. No connection is made
    /// until [`connect`](Self::connect).
    pub fn new(config: ClientConfig, store: impl StoreBackend + 'static, transport: T) -> Self {
        let fanout = Fanout::new(config.fanout_capacity);
        let (status, _) = watch::channel(ConnectionStatus::Offline);
        Self {
            config,
            transport: Arc::new(transport),
            store: Arc::new(store),
            fanout,
            interest: Mutex::new(BTreeSet::new()),
            commands: Mutex::new(None),
            status,
            write_lock: Mutex::new(()),
        }
    }

    /// Connect to the host and start a session.
    ///
    /// Subscriptions are requested for every room with persisted state plus
    /// every room the application subscribed to, and unconfirmed local
    /// updates flow out once the host confirms each room. The session runs
    /// in a background task until the connection dies or
    /// [`close`](Self::close) is called.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut commands = self.commands.lock().await;
        if *self.status.borrow() == ConnectionStatus::Connected {
            return Err(ClientError::AlreadyConnected);
        }

        self.transport.connect(&self.config.url).await?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let mut session = Session::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            self.fanout.clone(),
            rx,
            &self.config,
        );
        let interest = self.interest.lock().await.clone();
        if let Err(e) = session.bootstrap(&interest).await {
            let _ = self.transport.close().await;
            return Err(e);
        }

        *commands = Some(tx);
        self.status.send_replace(ConnectionStatus::Connected);

        let status = self.status.clone();
        tokio::spawn(async move {
            session.run().await.log();
            status.send_replace(ConnectionStatus::Offline);
        });
        Ok(())
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Check if a session is live.
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Watch connection status transitions.
    pub fn status_stream(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Stop the current session, if any, and wait for it to finish.
    pub async fn close(&self) {
        self.commands.lock().await.take();
        self.wait_disconnected().await;
    }

    async fn wait_disconnected(&self) {
        let mut status = self.status.subscribe();
        while *status.borrow_and_update() != ConnectionStatus::Offline {
            if status.changed().await.is_err() {
                return;
            }
        }
    }

    /// Subscribe to a room.
    ///
    /// Returns the locally known room data plus a stream of events for
    /// everything that lands after it. Works offline; when a session is (or
    /// becomes) live, the room is requested from the host. Subscribing to
    /// the same room twice is fine and causes no extra wire traffic.
    pub async fn subscribe(&self, room: impl Into<RoomName>) -> Result<Subscription, ClientError> {
        let room = room.into();
        self.interest.lock().await.insert(room.clone());

        // Register the receiver before reading, so no event can fall
        // between the data snapshot and the stream.
        let events = self.fanout.subscribe(&room);
        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        let data = txn.room_data(&room).await?;
        drop(txn);

        self.send_command(Command::Subscribe(room.clone())).await;
        Ok(Subscription { room, data, events })
    }

    /// Apply a local update to a room.
    ///
    /// The update is durable and visible to local subscribers when this
    /// returns, whatever the connection status. Returns the sequence number
    /// the update was persisted under.
    pub async fn update(
        &self,
        room: impl Into<RoomName>,
        payload: &[u8],
    ) -> Result<Offset, ClientError> {
        let room = room.into();
        // One writer at a time keeps send order equal to sequence order.
        let _guard = self.write_lock.lock().await;

        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        let seq = txn.write_client_unconfirmed(&room, payload).await?;
        txn.commit().await?;

        self.fanout
            .publish(&room, RoomEvent::Update(Arc::new(payload.to_vec())));
        self.send_command(Command::Update {
            room,
            seq,
            payload: payload.to_vec(),
        })
        .await;
        Ok(seq)
    }

    /// Read the full locally known data for a room.
    pub async fn room_data(&self, room: impl Into<RoomName>) -> Result<Vec<u8>, ClientError> {
        let room = room.into();
        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        Ok(txn.room_data(&room).await?)
    }

    /// Read a room's durable metadata.
    pub async fn room_meta(&self, room: impl Into<RoomName>) -> Result<RoomMeta, ClientError> {
        let room = room.into();
        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        Ok(txn.room_meta(&room).await?)
    }

    /// List every room with persisted state.
    pub async fn rooms(&self) -> Result<Vec<RoomName>, ClientError> {
        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        Ok(txn.rooms().await?)
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send_command(&self, command: Command) {
        let commands = self.commands.lock().await;
        if let Some(tx) = commands.as_ref() {
            if tx.send(command).await.is_err() {
                tracing::debug!("session gone; command dropped");
            }
        }
    }
}

/// A live subscription to one room.
///
/// Carries the room data as of subscription time and an event stream for
/// everything after it.
pub struct Subscription {
    room: RoomName,
    data: Vec<u8>,
    events: broadcast::Receiver<RoomEvent>,
}

impl Subscription {
    /// The subscribed room.
    pub fn room(&self) -> &RoomName {
        &self.room
    }

    /// Room data at the moment the subscription was created.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Receive the next room event.
    ///
    /// A receiver that falls behind gets [`RoomEvent::Lagged`] and should
    /// re-read the room from the client. Returns `None` once the client is
    /// gone.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        match self.events.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Some(RoomEvent::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
