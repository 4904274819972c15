//! Protocol messages and frame codec.
//!
//! The wire format is fixed by the host: every message starts with a one-byte
//! varint tag, integers are unsigned varints, strings and payloads are
//! length-prefixed. A transport frame is a plain concatenation of messages
//! with no outer length header; the receiver decodes until the frame is
//! exhausted.

use crate::error::WireError;
use crate::ids::{Offset, RoomEpoch, RoomName};
use crate::varint::{Reader, Writer};

/// Message type discriminator, the first varint of every encoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// An update payload, client- or host-originated
    Update = 0,
    /// Client requests (re-)subscription to one or more rooms
    SubscriptionRequest = 1,
    /// Host confirms durability up to an offset
    Confirmation = 2,
    /// Host activates a subscription
    SubscriptionConfirmation = 3,
}

impl TryFrom<u8> for MessageTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageTag::Update),
            1 => Ok(MessageTag::SubscriptionRequest),
            2 => Ok(MessageTag::Confirmation),
            3 => Ok(MessageTag::SubscriptionConfirmation),
            _ => Err(WireError::UnknownTag(value.into())),
        }
    }
}

/// One room entry inside a [`Message::SubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    /// Room to subscribe to.
    pub room: RoomName,
    /// Last host offset durably applied locally; the host replays from here.
    /// Zero when the room has never been synced.
    pub resume_offset: Offset,
}

impl SubscriptionEntry {
    /// Create a subscription entry.
    pub fn new(room: impl Into<RoomName>, resume_offset: Offset) -> Self {
        Self {
            room: room.into(),
            resume_offset,
        }
    }
}

/// All protocol messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// An update for one room.
    ///
    /// Outbound, `seq` is the local sequence number (`clientConf`) assigned
    /// when the update was durably queued. Inbound, `seq` is the host log
    /// offset the update was applied at. Both live on the same per-room
    /// number line.
    Update {
        /// Client sequence number or host offset, direction-dependent.
        seq: Offset,
        /// Target room.
        room: RoomName,
        /// Opaque payload bytes.
        payload: Vec<u8>,
    },

    /// Subscribe to a batch of rooms, each with a resume offset.
    SubscriptionRequest {
        /// Rooms to subscribe, batched to save round trips.
        entries: Vec<SubscriptionEntry>,
    },

    /// Cumulative durability acknowledgement for one room: everything at or
    /// below `offset` is durable at the host.
    Confirmation {
        /// Acknowledged room.
        room: RoomName,
        /// Host log position confirmed through.
        offset: Offset,
    },

    /// Host response activating a subscription.
    SubscriptionConfirmation {
        /// Activated room.
        room: RoomName,
        /// Host log position the carried payload brings the client to.
        offset: Offset,
        /// Incarnation of the room on the host; a change since the last
        /// subscription means local host history is stale.
        epoch: RoomEpoch,
        /// Room data from the requested resume offset forward. Empty when
        /// the client was already caught up.
        payload: Vec<u8>,
    },
}

impl Message {
    /// The wire tag for this message.
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::Update { .. } => MessageTag::Update,
            Message::SubscriptionRequest { .. } => MessageTag::SubscriptionRequest,
            Message::Confirmation { .. } => MessageTag::Confirmation,
            Message::SubscriptionConfirmation { .. } => MessageTag::SubscriptionConfirmation,
        }
    }

    /// Append the encoded message to a writer.
    pub fn encode_into(&self, w: &mut Writer) {
        match self {
            Message::Update { seq, room, payload } => {
                w.put_uvarint(MessageTag::Update as u64);
                w.put_uvarint(seq.value());
                w.put_string(room.as_str());
                w.put_bytes(payload);
            }
            Message::SubscriptionRequest { entries } => {
                w.put_uvarint(MessageTag::SubscriptionRequest as u64);
                w.put_uvarint(entries.len() as u64);
                for entry in entries {
                    w.put_string(entry.room.as_str());
                    w.put_uvarint(entry.resume_offset.value());
                }
            }
            Message::Confirmation { room, offset } => {
                w.put_uvarint(MessageTag::Confirmation as u64);
                w.put_string(room.as_str());
                w.put_uvarint(offset.value());
            }
            Message::SubscriptionConfirmation {
                room,
                offset,
                epoch,
                payload,
            } => {
                w.put_uvarint(MessageTag::SubscriptionConfirmation as u64);
                w.put_string(room.as_str());
                w.put_uvarint(offset.value());
                w.put_uvarint(epoch.value());
                w.put_bytes(payload);
            }
        }
    }

    /// Encode this message on its own.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_into(&mut w);
        w.into_bytes()
    }

    /// Decode one message from a reader, leaving the cursor on the next one.
    pub fn decode_from(r: &mut Reader<'_>) -> Result<Self, WireError> {
        let raw_tag = r.get_uvarint()?;
        let tag = match u8::try_from(raw_tag) {
            Ok(byte) => MessageTag::try_from(byte)?,
            Err(_) => return Err(WireError::UnknownTag(raw_tag)),
        };
        match tag {
            MessageTag::Update => {
                let seq = Offset::new(r.get_uvarint()?);
                let room = RoomName::from(r.get_string()?);
                let payload = r.get_bytes()?;
                Ok(Message::Update { seq, room, payload })
            }
            MessageTag::SubscriptionRequest => {
                let count = r.get_uvarint()?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let room = RoomName::from(r.get_string()?);
                    let resume_offset = Offset::new(r.get_uvarint()?);
                    entries.push(SubscriptionEntry {
                        room,
                        resume_offset,
                    });
                }
                Ok(Message::SubscriptionRequest { entries })
            }
            MessageTag::Confirmation => {
                let room = RoomName::from(r.get_string()?);
                let offset = Offset::new(r.get_uvarint()?);
                Ok(Message::Confirmation { room, offset })
            }
            MessageTag::SubscriptionConfirmation => {
                let room = RoomName::from(r.get_string()?);
                let offset = Offset::new(r.get_uvarint()?);
                let epoch = RoomEpoch::new(r.get_uvarint()?);
                let payload = r.get_bytes()?;
                Ok(Message::SubscriptionConfirmation {
                    room,
                    offset,
                    epoch,
                    payload,
                })
            }
        }
    }

    /// Decode one message from the front of a buffer, returning it together
    /// with the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let mut r = Reader::new(bytes);
        let message = Self::decode_from(&mut r)?;
        Ok((message, r.position()))
    }
}

/// Encode a batch of messages into one transport frame.
pub fn encode_frame(messages: &[Message]) -> Vec<u8> {
    let mut w = Writer::new();
    for message in messages {
        message.encode_into(&mut w);
    }
    w.into_bytes()
}

/// Decode every message in a transport frame, in order.
///
/// Fails on the first malformed field or unknown tag: message boundaries
/// past that point cannot be recovered, so nothing is skipped.
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<Message>, WireError> {
    let mut r = Reader::new(bytes);
    let mut messages = Vec::new();
    while !r.is_empty() {
        messages.push(Message::decode_from(&mut r)?);
    }
    Ok(messages)
}
