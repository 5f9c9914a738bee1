//! Runtime configuration for the heartbeat manager.

use std::time::Duration;

use crate::types::NodeId;

/// The three tunables the heartbeat core needs at construction time.
///
/// Loaded once by the host process's own configuration layer and handed to
/// [`crate::manager::HeartbeatManager::new`] by value; the core itself never
/// touches a file or environment variable.
#[derive(Clone, Debug)]
pub struct HeartbeatConfig {
    /// The nominal spacing between ticks, and the piggyback-elision window.
    pub heartbeat_interval: Duration,
    /// The per-RPC transport deadline.
    pub heartbeat_timeout: Duration,
    /// This node's identity, used to recognize self-targeted batches.
    pub self_node_id: NodeId,
}

impl HeartbeatConfig {
    pub fn new(self_node_id: NodeId) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(150),
            heartbeat_timeout: Duration::from_secs(3),
            self_node_id,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}
