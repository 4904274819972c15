//! Unconfirmed client update queue.
//!
//! Every locally produced update sits in this queue from the moment it is
//! durably persisted until the host confirms it. The queue preserves
//! creation order, its sequence numbers are strictly increasing, and host
//! confirmations are cumulative: acknowledging offset N removes every entry
//! with sequence ≤ N in one step.
//!
//! Entries are only ever re-sent on reconnect; within a live session the
//! host's confirmation is the sole way out of the queue.

use std::collections::VecDeque;
use sync_wire::Offset;

/// Error type for queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A pushed sequence number did not increase.
    NonMonotonic {
        /// Highest sequence already queued.
        last: Offset,
        /// Sequence number that was rejected.
        attempted: Offset,
    },
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::NonMonotonic { last, attempted } => {
                write!(
                    f,
                    "sequence {} does not increase past {}",
                    attempted, last
                )
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// One locally produced update awaiting host confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Local sequence number assigned when the update was persisted.
    pub seq: Offset,
    /// The opaque payload.
    pub payload: Vec<u8>,
}

impl PendingUpdate {
    /// Create a pending update.
    pub fn new(seq: Offset, payload: Vec<u8>) -> Self {
        Self { seq, payload }
    }
}

/// Ordered queue of unconfirmed client updates for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQueue {
    entries: VecDeque<PendingUpdate>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Rebuild a queue from persisted entries.
    ///
    /// Entries must already be in creation order with strictly increasing
    /// sequence numbers, which is how the store hands them back.
    pub fn from_entries(
        entries: impl IntoIterator<Item = PendingUpdate>,
    ) -> Result<Self, QueueError> {
        let mut queue = Self::new();
        for entry in entries {
            queue.push(entry.seq, entry.payload)?;
        }
        Ok(queue)
    }

    /// Number of unconfirmed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether everything has been confirmed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest queued sequence number.
    pub fn last_seq(&self) -> Option<Offset> {
        self.entries.back().map(|e| e.seq)
    }

    /// Append a freshly persisted update.
    ///
    /// The sequence number must be greater than everything already queued.
    pub fn push(&mut self, seq: Offset, payload: Vec<u8>) -> Result<(), QueueError> {
        if let Some(last) = self.last_seq() {
            if seq <= last {
                return Err(QueueError::NonMonotonic {
                    last,
                    attempted: seq,
                });
            }
        }
        self.entries.push_back(PendingUpdate::new(seq, payload));
        Ok(())
    }

    /// Whether a sequence number is still awaiting confirmation.
    pub fn contains(&self, seq: Offset) -> bool {
        self.entries.iter().any(|e| e.seq == seq)
    }

    /// Apply a cumulative host confirmation.
    ///
    /// Removes and returns every entry with sequence ≤ `offset`, in order.
    /// Entries above the offset stay queued.
    pub fn ack_through(&mut self, offset: Offset) -> Vec<PendingUpdate> {
        let mut confirmed = Vec::new();
        while self.entries.front().is_some_and(|e| e.seq <= offset) {
            confirmed.extend(self.entries.pop_front());
        }
        confirmed
    }

    /// Iterate entries in creation order (the resend order).
    pub fn iter(&self) -> impl Iterator<Item = &PendingUpdate> {
        self.entries.iter()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
