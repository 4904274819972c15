//! Error types for sync-client.

use crate::store::StoreError;
use crate::transport::TransportError;
use sync_wire::WireError;

/// Main error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The host broke the wire protocol. Fatal for the session.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The connection to the host failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The durable store failed. The triggering operation may not be durable.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// `connect` was called while a session is already running.
    #[error("already connected")]
    AlreadyConnected,
}

/// Fatal wire-level violations.
///
/// Message boundaries are unrecoverable past a corrupt field, so any of
/// these tears the session down; reconnecting builds a fresh one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    /// A frame that does not decode: bad varint, truncated field, unknown
    /// message tag.
    #[error("malformed frame: {0}")]
    Malformed(#[from] WireError),

    /// A well-formed message the host is not allowed to send.
    #[error("unexpected {0} message from host")]
    UnexpectedMessage(&'static str),

    /// An inbound frame above the configured size limit.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Configured maximum frame size.
        limit: usize,
    },
}
