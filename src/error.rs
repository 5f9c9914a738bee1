//! Error types for the heartbeat core.

use thiserror::Error;

use crate::types::NodeId;

/// A failure observed while attempting to deliver a batched heartbeat to a
/// single destination node.
///
/// Both variants are routed identically by the reply router: the
/// group is told the heartbeat failed and its suppression flag is cleared.
/// The distinction exists purely so the log line naming the cause is
/// precise. The same `TransportError` is handed to every group whose
/// `HBMeta` rode in the failed batch, so the variant holds an owned reason
/// string rather than the original `anyhow::Error` to keep it cheaply
/// cloneable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport itself returned an error for the RPC.
    #[error("heartbeat rpc to node {target} failed: {reason}")]
    Rpc { target: NodeId, reason: String },

    /// The inner per-RPC deadline elapsed before a reply arrived.
    #[error("heartbeat rpc to node {target} exceeded its deadline")]
    DeadlineExceeded { target: NodeId },
}

impl TransportError {
    pub fn rpc(target: NodeId, source: anyhow::Error) -> Self {
        Self::Rpc {
            target,
            reason: source.to_string(),
        }
    }
}
