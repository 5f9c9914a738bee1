//! The request planner: a pure function over a registry snapshot
//! that produces a per-destination-node batch plan and a reconnect set.
//!
//! Deliberately synchronous and side-effect-free on its own state so the
//! registry snapshot it observes stays coherent across the whole pass;
//! the only side effects are the calls made directly against
//! group handles (`update_suppress_heartbeats`, `next_follower_sequence`).

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::registry::GroupRegistry;
use crate::types::FollowerReqMeta;
use crate::types::GroupId;
use crate::types::HBMeta;
use crate::types::HBRequest;
use crate::types::NodeHeartbeat;
use crate::types::NodeId;

/// Plan one tick: walk every leading group's voters, eliding suppressed or
/// recently-replicated followers, and collapse the result into one batch
/// per destination node.
pub fn plan_tick(
    registry: &GroupRegistry,
    interval: Duration,
    self_node_id: NodeId,
    now: Instant,
) -> (Vec<NodeHeartbeat>, HashSet<NodeId>) {
    let last_heartbeat_threshold = now - interval;

    let mut pending: BTreeMap<NodeId, Vec<HBMeta>> = BTreeMap::new();
    let mut meta_maps: BTreeMap<NodeId, BTreeMap<GroupId, FollowerReqMeta>> = BTreeMap::new();
    let mut reconnect = HashSet::new();

    for group in registry.iter() {
        if !group.is_leader() {
            continue;
        }

        let preamble = group.meta();
        let self_vnode = group.self_vnode();

        let mut voters = Vec::new();
        group.for_each_voter(&mut |v| voters.push(v));

        for v in voters {
            if v == self_vnode {
                let hb = HBMeta::new(preamble, self_vnode, v);
                pending.entry(self_node_id).or_default().push(hb);
                meta_maps.entry(self_node_id).or_default().insert(
                    preamble.group,
                    FollowerReqMeta {
                        seq: 0,
                        dirty_offset: preamble.prev_log_index,
                        follower_vnode: v,
                    },
                );
                continue;
            }

            if group.heartbeats_suppressed(v) {
                tracing::trace!(group = preamble.group, node = v.node_id, "heartbeat suppressed, eliding");
                continue;
            }

            if group.last_append_timestamp(v) > last_heartbeat_threshold {
                tracing::trace!(group = preamble.group, node = v.node_id, "recent append, eliding heartbeat");
                continue;
            }

            let seq = group.next_follower_sequence(v);
            group.update_suppress_heartbeats(v, seq, true);

            let hb = HBMeta::new(preamble, self_vnode, v);
            pending.entry(v.node_id).or_default().push(hb);
            meta_maps.entry(v.node_id).or_default().insert(
                preamble.group,
                FollowerReqMeta {
                    seq,
                    dirty_offset: preamble.prev_log_index,
                    follower_vnode: v,
                },
            );

            if group.should_reconnect_follower(v) {
                reconnect.insert(v.node_id);
            }
        }
    }

    let batches: Vec<NodeHeartbeat> = pending
        .into_iter()
        .map(|(target, entries)| {
            let meta_map = meta_maps.remove(&target).unwrap_or_default();
            debug_assert_eq!(
                entries.iter().map(|e| e.group).collect::<HashSet<_>>(),
                meta_map.keys().copied().collect::<HashSet<_>>(),
                "meta_map must name exactly the groups present in the request"
            );
            NodeHeartbeat {
                target,
                request: HBRequest { entries },
                meta_map,
            }
        })
        .collect();

    tracing::trace!(batches = batches.len(), reconnects = reconnect.len(), "planned tick");

    (batches, reconnect)
}
