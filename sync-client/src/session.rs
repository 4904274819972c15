//! Connection session loop.
//!
//! A session owns one connection from connect to teardown. It is the only
//! place where inbound frames are applied and outbound frames are produced,
//! so per-room ordering needs no locking: everything funnels through one
//! task that alternates between the transport and the command channel fed
//! by [`SyncClient`](crate::client::SyncClient).
//!
//! Frame handling is transactional. All records touched by one inbound
//! frame commit together, and fan-out events plus reply frames go out only
//! after that commit. A frame that fails to decode, or carries a message
//! the host must not send, tears the session down without committing
//! anything.

use std::collections::BTreeSet;
use std::sync::Arc;

use sync_core::{ConfirmOutcome, PendingQueue, Reconciler, SubscriptionOutcome};
use sync_wire::{decode_frame, encode_frame, Message, Offset, RoomName};
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::error::{ClientError, ProtocolViolation};
use crate::fanout::{Fanout, RoomEvent};
use crate::store::{RoomTxn, StoreBackend, StoreError};
use crate::transport::{Transport, TransportError};

/// Work sent from client handles into the session task.
#[derive(Debug)]
pub(crate) enum Command {
    /// A local update the store has already made durable.
    Update {
        room: RoomName,
        seq: Offset,
        payload: Vec<u8>,
    },
    /// Request a subscription for a room.
    Subscribe(RoomName),
}

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum Teardown {
    /// The client dropped its command sender.
    Closed,
    /// The connection failed or was closed by the peer.
    Transport(TransportError),
    /// The host broke the protocol; the connection is not trustworthy.
    Protocol(ProtocolViolation),
    /// Local persistence failed.
    Store(StoreError),
}

impl From<TransportError> for Teardown {
    fn from(e: TransportError) -> Self {
        Teardown::Transport(e)
    }
}

impl From<ProtocolViolation> for Teardown {
    fn from(e: ProtocolViolation) -> Self {
        Teardown::Protocol(e)
    }
}

impl From<StoreError> for Teardown {
    fn from(e: StoreError) -> Self {
        Teardown::Store(e)
    }
}

impl Teardown {
    pub(crate) fn log(&self) {
        match self {
            Teardown::Closed => tracing::info!("session closed"),
            Teardown::Transport(e) => tracing::info!(error = %e, "session ended by transport"),
            Teardown::Protocol(e) => tracing::warn!(error = %e, "session torn down"),
            Teardown::Store(e) => tracing::error!(error = %e, "session ended by store failure"),
        }
    }
}

/// One connection's worth of sync work.
pub(crate) struct Session<T: Transport> {
    transport: Arc<T>,
    store: Arc<dyn StoreBackend>,
    fanout: Fanout,
    rooms: Reconciler,
    commands: mpsc::Receiver<Command>,
    max_frame_size: usize,
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        store: Arc<dyn StoreBackend>,
        fanout: Fanout,
        commands: mpsc::Receiver<Command>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            store,
            fanout,
            rooms: Reconciler::new(),
            commands,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Seed the reconciler and request subscriptions for every room that is
    /// either persisted or subscribed to by the application.
    ///
    /// Runs once, before the session loop, while connect() is still able to
    /// report errors to the caller.
    pub(crate) async fn bootstrap(
        &mut self,
        interest: &BTreeSet<RoomName>,
    ) -> Result<(), ClientError> {
        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        let mut rooms: BTreeSet<RoomName> = txn.rooms().await?.into_iter().collect();
        rooms.extend(interest.iter().cloned());
        for room in &rooms {
            self.restore_room(&mut txn, room).await?;
        }
        drop(txn);

        let entries = self.rooms.begin_subscriptions(rooms);
        if !entries.is_empty() {
            tracing::debug!(count = entries.len(), "requesting subscriptions");
            let frame = encode_frame(&[Message::SubscriptionRequest { entries }]);
            self.transport.send(&frame).await?;
        }
        Ok(())
    }

    async fn restore_room(&mut self, txn: &mut RoomTxn, room: &RoomName) -> Result<(), StoreError> {
        let meta = txn.room_meta(room).await?;
        let pending = PendingQueue::from_entries(txn.pending_updates(room).await?)
            .map_err(|e| StoreError::Corrupt(format!("pending queue for {room}: {e}")))?;
        self.rooms
            .restore(room.clone(), meta.confirmed, meta.epoch, pending);
        Ok(())
    }

    /// Drive the session until it ends, then close the transport.
    pub(crate) async fn run(mut self) -> Teardown {
        let teardown = loop {
            tokio::select! {
                frame = self.transport.recv() => match frame {
                    Ok(frame) => {
                        if let Err(teardown) = self.handle_frame(&frame).await {
                            break teardown;
                        }
                    }
                    Err(e) => break Teardown::Transport(e),
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(teardown) = self.handle_command(command).await {
                            break teardown;
                        }
                    }
                    None => break Teardown::Closed,
                },
            }
        };
        let _ = self.transport.close().await;
        teardown
    }

    async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Teardown> {
        if frame.len() > self.max_frame_size {
            return Err(Teardown::Protocol(ProtocolViolation::FrameTooLarge {
                size: frame.len(),
                limit: self.max_frame_size,
            }));
        }
        let messages = decode_frame(frame).map_err(ProtocolViolation::Malformed)?;

        let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
        let mut outbound = Vec::new();
        let mut events = Vec::new();
        for message in messages {
            self.apply_message(&mut txn, message, &mut outbound, &mut events)
                .await?;
        }
        txn.commit().await?;

        // Fan-out and resends only after the whole frame is durable.
        for (room, event) in events {
            self.fanout.publish(&room, event);
        }
        if !outbound.is_empty() {
            self.transport.send(&encode_frame(&outbound)).await?;
        }
        Ok(())
    }

    async fn apply_message(
        &mut self,
        txn: &mut RoomTxn,
        message: Message,
        outbound: &mut Vec<Message>,
        events: &mut Vec<(RoomName, RoomEvent)>,
    ) -> Result<(), Teardown> {
        match message {
            Message::Update { seq, room, payload } => {
                txn.write_host_unconfirmed(&room, seq, &payload).await?;
                events.push((room, RoomEvent::Update(Arc::new(payload))));
            }
            Message::SubscriptionConfirmation {
                room,
                offset,
                epoch,
                payload,
            } => {
                txn.confirm_subscription(&room, epoch, offset, &payload).await?;
                let outcome = self.rooms.confirm_subscription(&room, epoch, offset);
                tracing::debug!(room = %room, offset = %offset, ?outcome, "subscription confirmed");
                if !matches!(outcome, SubscriptionOutcome::AlreadySubscribed) {
                    // The room just went live; flush every unconfirmed
                    // local update and hand subscribers a fresh baseline.
                    outbound.extend(self.rooms.resend_updates(&room));
                    let data = txn.room_data(&room).await?;
                    events.push((room, RoomEvent::Reset(Arc::new(data))));
                }
            }
            Message::Confirmation { room, offset } => {
                txn.write_confirmed_by_host(&room, offset).await?;
                if let ConfirmOutcome::Advanced { pruned } =
                    self.rooms.record_confirmation(&room, offset)
                {
                    tracing::debug!(room = %room, offset = %offset, covered = pruned.len(), "host confirmation");
                }
            }
            Message::SubscriptionRequest { .. } => {
                return Err(Teardown::Protocol(ProtocolViolation::UnexpectedMessage(
                    "subscription request",
                )));
            }
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), Teardown> {
        match command {
            Command::Update { room, seq, payload } => {
                if let Err(e) = self.rooms.record_local_update(&room, seq, payload.clone()) {
                    tracing::warn!(room = %room, seq = %seq, error = %e, "dropping out-of-order local update");
                    return Ok(());
                }
                let frame = encode_frame(&[Message::Update { seq, room, payload }]);
                self.transport.send(&frame).await?;
            }
            Command::Subscribe(room) => {
                if self.rooms.room(room.as_str()).is_none() {
                    let mut txn = RoomTxn::begin(self.store.as_ref()).await?;
                    self.restore_room(&mut txn, &room).await?;
                }
                if let Some(entry) = self.rooms.begin_subscription(&room) {
                    tracing::debug!(room = %room, resume = %entry.resume_offset, "requesting subscription");
                    let frame = encode_frame(&[Message::SubscriptionRequest {
                        entries: vec![entry],
                    }]);
                    self.transport.send(&frame).await?;
                }
            }
        }
        Ok(())
    }
}
