//! CLI command implementations.

pub mod rooms;
pub mod send;
pub mod status;
pub mod watch;
