//! Error types for the wire codec.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire messages.
///
/// Every variant here is a protocol violation when raised on inbound data:
/// past a malformed field the remaining frame boundaries are unrecoverable,
/// so callers tear the session down rather than resynchronize.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The frame ended before the current field was complete
    #[error("unexpected end of frame: needed {needed} more byte(s) at position {position}")]
    UnexpectedEof {
        /// Bytes still required by the field being read.
        needed: usize,
        /// Read position where the shortfall was detected.
        position: usize,
    },

    /// A varint ran past the 64-bit range
    #[error("varint overflows 64 bits at position {position}")]
    VarintOverflow {
        /// Read position of the first byte of the varint.
        position: usize,
    },

    /// A declared length exceeds what remains in the frame
    #[error("declared length {declared} exceeds remaining {remaining} byte(s)")]
    LengthTooLong {
        /// Length carried by the prefix.
        declared: u64,
        /// Bytes actually left in the frame.
        remaining: usize,
    },

    /// A room name was not valid UTF-8
    #[error("room name is not valid utf-8")]
    InvalidRoomName,

    /// Unrecognized message type tag
    #[error("unknown message tag: {0}")]
    UnknownTag(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::UnknownTag(99);
        assert_eq!(err.to_string(), "unknown message tag: 99");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
