//! Core data types shared by the planner, dispatcher, and reply router.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Opaque, totally ordered, hashable identifier of a consensus group.
pub type GroupId = u64;

/// Opaque, hashable identifier of a physical peer in the cluster.
pub type NodeId = u64;

/// A monotonically increasing per-follower send sequence number.
///
/// `seq = 0` is reserved for self-beats, which are never subject to the
/// stale-reply rejection that real sequence numbers enable.
pub type Seq = u64;

/// A specific incarnation of a node within a group's voting configuration.
///
/// Two `VNode`s sharing a `node_id` but differing in `revision` are distinct
/// followers: a configuration change produces a new `VNode`, and the
/// suppression/sequence bookkeeping the core tracks never straddles that
/// boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VNode {
    pub node_id: NodeId,
    pub revision: u64,
}

impl VNode {
    pub fn new(node_id: NodeId, revision: u64) -> Self {
        Self { node_id, revision }
    }
}

/// A display-only namespace/topic/partition identity, carried purely for log
/// correlation. Opaque to the heartbeat core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ntp {
    pub namespace: String,
    pub topic: String,
    pub partition: u32,
}

impl std::fmt::Display for Ntp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.topic, self.partition)
    }
}

/// The append-entries preamble for a group as of "now", independent of any
/// particular follower.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HBPreamble {
    pub group: GroupId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub commit_index: u64,
    pub current_term: u64,
}

/// The per-group payload carried inside a batched request, addressed to one
/// follower on the destination node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HBMeta {
    pub group: GroupId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub commit_index: u64,
    pub current_term: u64,
    pub source_vnode: VNode,
    pub target_vnode: VNode,
}

impl HBMeta {
    pub fn new(preamble: HBPreamble, source_vnode: VNode, target_vnode: VNode) -> Self {
        Self {
            group: preamble.group,
            prev_log_index: preamble.prev_log_index,
            prev_log_term: preamble.prev_log_term,
            commit_index: preamble.commit_index,
            current_term: preamble.current_term,
            source_vnode,
            target_vnode,
        }
    }
}

/// A batched heartbeat request addressed to a single destination node: an
/// ordered sequence of `HBMeta`, each for a distinct group whose leader lives
/// locally and whose follower on that node is due.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HBRequest {
    pub entries: Vec<HBMeta>,
}

/// Per-`(destination_node, group)` in-flight bookkeeping, consumed during
/// reply processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FollowerReqMeta {
    pub seq: Seq,
    pub dirty_offset: u64,
    pub follower_vnode: VNode,
}

/// One node-addressed batch produced by the planner and consumed by the
/// dispatcher and reply router.
///
/// The domain of `meta_map` must equal the set of groups present in
/// `request`.
#[derive(Debug)]
pub struct NodeHeartbeat {
    pub target: NodeId,
    pub request: HBRequest,
    pub meta_map: BTreeMap<GroupId, FollowerReqMeta>,
}

/// One group's entry within a successful batched reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HBReplyEntry {
    pub group: GroupId,
    pub node_id: NodeId,
    pub term: u64,
    pub success: bool,
}

/// A successful batched reply from a destination node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HBReply {
    pub entries: Vec<HBReplyEntry>,
}
