//! Client configuration.
//!
//! Plain struct with sensible defaults. Applications that load settings
//! from a file can deserialize it directly; timeouts are given in
//! milliseconds there.

use std::time::Duration;

use serde::Deserialize;

/// Default bound on blocking-view calls.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of events buffered per `observe()` stream before a slow
/// observer starts skipping.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Settings for a [`ClusterPubSubConnection`](crate::ClusterPubSubConnection).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterPubSubConfig {
    /// Maximum time a blocking-view call waits for its reply.
    #[serde(rename = "command_timeout_ms", deserialize_with = "millis")]
    pub command_timeout: Duration,

    /// Broadcast capacity for event observers.
    pub event_capacity: usize,

    /// Whether messages from every node reach listeners, or only messages
    /// from the home node.
    pub node_message_propagation: bool,
}

impl Default for ClusterPubSubConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            node_message_propagation: true,
        }
    }
}

impl ClusterPubSubConfig {
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Zero is bumped to one; a broadcast channel needs room for at least
    /// one event.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_node_message_propagation(mut self, enabled: bool) -> Self {
        self.node_message_propagation = enabled;
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
