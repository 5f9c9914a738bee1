//! The reply router: demultiplexes one destination node's outcome
//! back into per-group state updates.

use std::collections::BTreeMap;

use crate::error::TransportError;
use crate::registry::GroupRegistry;
use crate::types::FollowerReqMeta;
use crate::types::GroupId;
use crate::types::HBReply;
use crate::types::HBReplyEntry;
use crate::types::NodeHeartbeat;
use crate::types::NodeId;

/// Fabricate a self-targeted reply: every `HBMeta` in the batch's request
/// becomes a successful entry carrying the follower's own node id, so a
/// single-node group still makes progress.
pub fn synthesize_self_reply(batch: &NodeHeartbeat) -> HBReply {
    let entries = batch
        .request
        .entries
        .iter()
        .map(|m| HBReplyEntry {
            group: m.group,
            node_id: m.target_vnode.node_id,
            term: m.current_term,
            success: true,
        })
        .collect();
    HBReply { entries }
}

/// Route a successful batched reply back into the originating groups.
pub fn route_success(registry: &GroupRegistry, origin_node: NodeId, meta_map: &BTreeMap<GroupId, FollowerReqMeta>, reply: HBReply) {
    for entry in reply.entries {
        let meta = match meta_map.get(&entry.group) {
            Some(meta) => meta,
            None => {
                tracing::error!(group = entry.group, node = origin_node, "reply names a group absent from its own meta_map");
                continue;
            }
        };
        let group = match registry.get(entry.group) {
            Some(group) => group,
            None => {
                tracing::error!(group = entry.group, node = origin_node, "cannot find consensus group for heartbeat reply");
                continue;
            }
        };

        group.update_heartbeat_status(meta.follower_vnode, true);
        group.update_suppress_heartbeats(meta.follower_vnode, meta.seq, false);
        group.process_append_entries_reply(origin_node, Ok(entry), meta.seq, meta.dirty_offset);
    }
}

/// Route a transport failure (RPC error or inner-deadline elapse) back into
/// every group that rode in the failed batch.
pub fn route_failure(registry: &GroupRegistry, origin_node: NodeId, meta_map: &BTreeMap<GroupId, FollowerReqMeta>, error: TransportError) {
    for (group_id, meta) in meta_map {
        let group = match registry.get(*group_id) {
            Some(group) => group,
            None => {
                tracing::error!(group = group_id, node = origin_node, "cannot find consensus group for heartbeat failure");
                continue;
            }
        };

        group.update_heartbeat_status(meta.follower_vnode, false);
        group.update_suppress_heartbeats(meta.follower_vnode, meta.seq, false);
        group.process_append_entries_reply(origin_node, Err(error.clone()), meta.seq, meta.dirty_offset);
        group.record_heartbeat_request_error();
    }
}
