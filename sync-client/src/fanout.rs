//! Room event fan-out.
//!
//! Every room has at most one broadcast channel; subscribers created through
//! [`Fanout::subscribe`] receive events published for that room. Delivery is
//! best effort: publishing never waits for receivers, a room with no
//! receivers drops the event, and a receiver that falls behind the channel
//! capacity observes a [`RoomEvent::Lagged`] gap instead of blocking the
//! publisher. Durable state always lives in the store, so a dropped or
//! lagged event costs a refresh, never data.

use std::sync::Arc;

use dashmap::DashMap;
use sync_wire::RoomName;
use tokio::sync::broadcast;

/// An in-process notification about a room.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// New update bytes were appended to the room.
    Update(Arc<Vec<u8>>),
    /// The room's data was rebuilt; the payload is the full room data.
    Reset(Arc<Vec<u8>>),
    /// The receiver fell behind and missed this many events.
    Lagged(u64),
}

/// Per-room broadcast channel registry.
///
/// Cheap to clone; clones share the same channels.
#[derive(Debug, Clone)]
pub struct Fanout {
    channels: Arc<DashMap<RoomName, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl Fanout {
    /// Create a registry whose channels buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Open a receiver for `room`, creating its channel on first use.
    pub fn subscribe(&self, room: &RoomName) -> broadcast::Receiver<RoomEvent> {
        self.channels
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event to `room`'s current receivers, if any.
    pub fn publish(&self, room: &RoomName, event: RoomEvent) {
        if let Some(sender) = self.channels.get(room) {
            // A send error just means nobody is listening right now.
            let _ = sender.send(event);
        }
    }

    /// Number of live receivers for `room`.
    pub fn subscriber_count(&self, room: &RoomName) -> usize {
        self.channels
            .get(room)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
