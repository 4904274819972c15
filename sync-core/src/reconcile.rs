//! Session-scoped room map.
//!
//! A [`Reconciler`] holds the reconciliation state for every room one
//! connection session knows about. It is an owned, keyed collection with the
//! session's lifetime; there is no process-wide room state. The session
//! feeds it store records at bootstrap, wire messages as they arrive, and
//! local mutations as they are persisted; it answers with what to send.

use crate::pending::{PendingQueue, QueueError};
use crate::room::{ConfirmOutcome, RoomState, SubscriptionOutcome};
use std::collections::HashMap;
use sync_wire::{Message, Offset, RoomEpoch, RoomName, SubscriptionEntry};

/// Reconciliation state for every room of one connection session.
#[derive(Debug, Default)]
pub struct Reconciler {
    rooms: HashMap<RoomName, RoomState>,
}

impl Reconciler {
    /// Create an empty reconciler.
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Number of rooms tracked.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no rooms are tracked.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Look up one room.
    pub fn room(&self, room: &str) -> Option<&RoomState> {
        self.rooms.get(room)
    }

    /// Iterate all rooms and their state.
    pub fn rooms(&self) -> impl Iterator<Item = (&RoomName, &RoomState)> {
        self.rooms.iter()
    }

    fn room_mut(&mut self, room: &RoomName) -> &mut RoomState {
        self.rooms.entry(room.clone()).or_default()
    }

    /// Seed a room from persisted store records at session bootstrap.
    pub fn restore(
        &mut self,
        room: RoomName,
        confirmed: Offset,
        epoch: Option<RoomEpoch>,
        pending: PendingQueue,
    ) {
        self.rooms
            .insert(room, RoomState::restore(confirmed, epoch, pending));
    }

    /// Move a room towards Requested, yielding its subscription entry.
    ///
    /// `None` when a request is already in flight or confirmed, so callers
    /// can subscribe as often as they like without duplicate wire traffic.
    pub fn begin_subscription(&mut self, room: &RoomName) -> Option<SubscriptionEntry> {
        let resume = self.room_mut(room).begin_subscription()?;
        Some(SubscriptionEntry::new(room.clone(), resume))
    }

    /// Begin subscriptions for a batch of rooms, collecting the entries that
    /// actually need requesting into one list (one wire message, many rooms).
    pub fn begin_subscriptions<I>(&mut self, rooms: I) -> Vec<SubscriptionEntry>
    where
        I: IntoIterator<Item = RoomName>,
    {
        rooms
            .into_iter()
            .filter_map(|room| self.begin_subscription(&room))
            .collect()
    }

    /// Apply a subscription confirmation from the host.
    pub fn confirm_subscription(
        &mut self,
        room: &RoomName,
        epoch: RoomEpoch,
        offset: Offset,
    ) -> SubscriptionOutcome {
        self.room_mut(room).confirm_subscription(epoch, offset)
    }

    /// Mirror a locally produced update that the store just persisted.
    pub fn record_local_update(
        &mut self,
        room: &RoomName,
        seq: Offset,
        payload: Vec<u8>,
    ) -> Result<(), QueueError> {
        self.room_mut(room).record_local(seq, payload)
    }

    /// Apply a cumulative host confirmation.
    pub fn record_confirmation(&mut self, room: &RoomName, offset: Offset) -> ConfirmOutcome {
        self.room_mut(room).record_confirmation(offset)
    }

    /// Build the resend batch for a room that just (re-)entered Subscribed:
    /// every unconfirmed client update as an Update message, in original
    /// sequence order.
    pub fn resend_updates(&self, room: &RoomName) -> Vec<Message> {
        let Some(state) = self.rooms.get(room.as_str()) else {
            return Vec::new();
        };
        state
            .pending()
            .iter()
            .map(|entry| Message::Update {
                seq: entry.seq,
                room: room.clone(),
                payload: entry.payload.clone(),
            })
            .collect()
    }
}
