//! Per-room reconciliation state.
//!
//! Each room tracks where it stands with the host: whether a subscription
//! is active, which host offset is durably applied locally, and which
//! locally produced updates are still unconfirmed. The methods here are
//! pure transitions; persistence and wire traffic happen in sync-client.

use crate::pending::{PendingQueue, PendingUpdate, QueueError};
use sync_wire::{Offset, RoomEpoch};

/// Where a room stands in the subscription handshake.
///
/// Rooms move Unsubscribed → Requested → Subscribed and never back;
/// session teardown discards the whole state instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No subscription requested on this connection yet.
    Unsubscribed,
    /// A subscription request is in flight.
    Requested,
    /// The host confirmed the subscription.
    Subscribed,
}

/// What a subscription confirmation did to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// First confirmation on this connection; the room is now live.
    Activated,
    /// The host rebuilt the room since we last saw it: local host history
    /// is stale and the carried snapshot replaces it.
    Rebuilt {
        /// Epoch the room had before this confirmation.
        previous: RoomEpoch,
    },
    /// Duplicate confirmation for the current epoch; nothing changed.
    AlreadySubscribed,
}

/// What a host confirmation did to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The confirmed offset advanced; these entries left the queue.
    Advanced {
        /// Unconfirmed entries covered by the new offset, in order.
        pruned: Vec<PendingUpdate>,
    },
    /// Offset at or below what is already confirmed.
    Stale,
}

/// Reconciliation state for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    subscription: SubscriptionState,
    epoch: Option<RoomEpoch>,
    confirmed: Offset,
    pending: PendingQueue,
}

impl RoomState {
    /// A room nothing is known about yet.
    pub fn new() -> Self {
        Self {
            subscription: SubscriptionState::Unsubscribed,
            epoch: None,
            confirmed: Offset::zero(),
            pending: PendingQueue::new(),
        }
    }

    /// Rebuild room state from persisted records at session start.
    ///
    /// The subscription always begins Unsubscribed: a new connection must
    /// re-request every room regardless of what the store remembers.
    pub fn restore(confirmed: Offset, epoch: Option<RoomEpoch>, pending: PendingQueue) -> Self {
        Self {
            subscription: SubscriptionState::Unsubscribed,
            epoch,
            confirmed,
            pending,
        }
    }

    /// Current handshake position.
    pub fn subscription(&self) -> SubscriptionState {
        self.subscription
    }

    /// Whether the host has confirmed the subscription on this connection.
    pub fn is_subscribed(&self) -> bool {
        self.subscription == SubscriptionState::Subscribed
    }

    /// Epoch of the room on the host, if any confirmation has been seen.
    pub fn epoch(&self) -> Option<RoomEpoch> {
        self.epoch
    }

    /// Last host offset known to be durably applied locally.
    pub fn confirmed_offset(&self) -> Offset {
        self.confirmed
    }

    /// The unconfirmed client update queue.
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Move Unsubscribed → Requested.
    ///
    /// Returns the resume offset to put in the subscription request, or
    /// `None` when a request is already in flight or confirmed. Repeated
    /// subscribe calls never produce duplicate requests.
    pub fn begin_subscription(&mut self) -> Option<Offset> {
        match self.subscription {
            SubscriptionState::Unsubscribed => {
                self.subscription = SubscriptionState::Requested;
                Some(self.confirmed)
            }
            SubscriptionState::Requested | SubscriptionState::Subscribed => None,
        }
    }

    /// Apply a subscription confirmation from the host.
    pub fn confirm_subscription(
        &mut self,
        epoch: RoomEpoch,
        offset: Offset,
    ) -> SubscriptionOutcome {
        match self.epoch {
            Some(previous) if previous != epoch => {
                // Host rebuilt the room: the carried offset is authoritative
                // even when it regresses. Unconfirmed client updates stay
                // queued; they have still never been confirmed.
                self.epoch = Some(epoch);
                self.confirmed = offset;
                self.subscription = SubscriptionState::Subscribed;
                SubscriptionOutcome::Rebuilt { previous }
            }
            _ => {
                let duplicate = self.subscription == SubscriptionState::Subscribed;
                self.epoch = Some(epoch);
                self.confirmed = self.confirmed.max(offset);
                self.subscription = SubscriptionState::Subscribed;
                if duplicate {
                    SubscriptionOutcome::AlreadySubscribed
                } else {
                    SubscriptionOutcome::Activated
                }
            }
        }
    }

    /// Record a locally produced update that was just durably persisted.
    pub fn record_local(&mut self, seq: Offset, payload: Vec<u8>) -> Result<(), QueueError> {
        self.pending.push(seq, payload)
    }

    /// Apply a cumulative host confirmation.
    pub fn record_confirmation(&mut self, offset: Offset) -> ConfirmOutcome {
        if offset <= self.confirmed {
            return ConfirmOutcome::Stale;
        }
        self.confirmed = offset;
        ConfirmOutcome::Advanced {
            pruned: self.pending.ack_through(offset),
        }
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}
