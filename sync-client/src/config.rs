//! Client configuration.

/// Default capacity of each room's fan-out channel.
pub const DEFAULT_FANOUT_CAPACITY: usize = 256;

/// Default maximum size of one inbound frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Configuration for [`SyncClient`](crate::SyncClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// URL of the host to connect to (e.g. `ws://localhost:9000/sync`).
    pub url: String,
    /// Capacity of each room's fan-out channel. A local consumer that falls
    /// further behind than this sees a lag notice instead of the missed
    /// events.
    pub fanout_capacity: usize,
    /// Maximum accepted size of one inbound frame.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Create a configuration for the given host URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the per-room fan-out channel capacity.
    pub fn with_fanout_capacity(mut self, capacity: usize) -> Self {
        self.fanout_capacity = capacity;
        self
    }

    /// Set the maximum accepted inbound frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new("ws://host:9000/sync");
        assert_eq!(config.url, "ws://host:9000/sync");
        assert_eq!(config.fanout_capacity, DEFAULT_FANOUT_CAPACITY);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn config_builder_pattern() {
        let config = ClientConfig::new("ws://host:9000")
            .with_fanout_capacity(8)
            .with_max_frame_size(4096);

        assert_eq!(config.fanout_capacity, 8);
        assert_eq!(config.max_frame_size, 4096);
    }
}
