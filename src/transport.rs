//! The transport facade the heartbeat core requires.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::types::HBReply;
use crate::types::HBRequest;
use crate::types::NodeId;

/// Per-call options for a batched heartbeat send.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatOpts {
    pub deadline: Instant,
    pub compression: bool,
    pub min_compression_bytes: usize,
}

/// The RPC transport the dispatcher sends batched heartbeats through.
///
/// Implementations are assumed internally thread-safe and tolerant of many
/// concurrently outstanding sends; the core clones its `Arc<dyn
/// Transport>` handle freely across dispatch futures.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a batched heartbeat request to `target`, honoring `opts.deadline`.
    async fn heartbeat(
        &self,
        target: NodeId,
        req: HBRequest,
        opts: HeartbeatOpts,
    ) -> Result<HBReply, TransportError>;

    /// Force-disconnect `target`'s underlying connection, returning whether a
    /// connection was actually torn down.
    async fn ensure_disconnect(&self, target: NodeId) -> bool;
}
