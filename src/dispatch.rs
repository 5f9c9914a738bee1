//! The dispatcher: fans out one tick's planned batches, applies the
//! double deadline, and routes every outcome through the reply router.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::registry::GroupRegistry;
use crate::router;
use crate::transport::HeartbeatOpts;
use crate::transport::Transport;
use crate::types::NodeHeartbeat;
use crate::types::NodeId;

/// Run one dispatch cycle: disconnect the nodes the planner flagged, then
/// send every batch concurrently and route each outcome as it settles.
///
/// Borrows `registry` for the whole cycle rather than cloning handles out of
/// it, matching the design note that the registry is read-only for the
/// duration of a dispatch held under the manager's mutex.
pub async fn run(
    transport: &Arc<dyn Transport>,
    registry: &GroupRegistry,
    batches: Vec<NodeHeartbeat>,
    reconnect: HashSet<NodeId>,
    self_node_id: NodeId,
    heartbeat_timeout: Duration,
    heartbeat_interval: Duration,
) {
    for node in reconnect {
        let disconnected = transport.ensure_disconnect(node).await;
        if disconnected {
            tracing::info!(node, "forced reconnect of unresponsive node");
        }
    }

    // Boxed with an explicit borrowed lifetime rather than `FutureExt::boxed`,
    // since these futures hold onto `registry` and `transport` for their
    // duration and are never required to outlive this function.
    let mut sends: FuturesUnordered<Pin<Box<dyn Future<Output = ()> + Send + '_>>> = FuturesUnordered::new();
    for batch in batches {
        if batch.target == self_node_id {
            sends.push(Box::pin(dispatch_self(registry, batch)));
        } else {
            sends.push(Box::pin(dispatch_remote(transport, registry, batch, heartbeat_timeout, heartbeat_interval)));
        }
    }

    while sends.next().await.is_some() {}
}

async fn dispatch_self(registry: &GroupRegistry, batch: NodeHeartbeat) {
    tracing::trace!(groups = batch.request.entries.len(), "routing self-heartbeat");
    let reply = router::synthesize_self_reply(&batch);
    router::route_success(registry, batch.target, &batch.meta_map, reply);
}

async fn dispatch_remote(
    transport: &Arc<dyn Transport>,
    registry: &GroupRegistry,
    batch: NodeHeartbeat,
    heartbeat_timeout: Duration,
    heartbeat_interval: Duration,
) {
    let target = batch.target;
    let groups = batch.request.entries.len();
    tracing::trace!(node = target, groups, "sending batched heartbeat");

    let opts = HeartbeatOpts {
        deadline: Instant::now() + heartbeat_timeout,
        compression: true,
        min_compression_bytes: 512,
    };

    let send = transport.heartbeat(target, batch.request, opts);
    let inner = tokio::time::timeout(heartbeat_timeout, send);

    // The outer deadline bounds how long the dispatcher itself waits on this
    // send; it is deliberately not routed as a failure: routing
    // it would double-clear suppression and could race an eventual real
    // reply that arrives after the tick loop has moved on.
    match tokio::time::timeout(heartbeat_interval, inner).await {
        Ok(Ok(Ok(reply))) => {
            tracing::trace!(node = target, "heartbeat reply received");
            router::route_success(registry, target, &batch.meta_map, reply);
        }
        Ok(Ok(Err(err))) => {
            tracing::trace!(node = target, error = %err, "heartbeat rpc failed");
            router::route_failure(registry, target, &batch.meta_map, err);
        }
        Ok(Err(_elapsed)) => {
            tracing::trace!(node = target, "heartbeat rpc exceeded its deadline");
            router::route_failure(registry, target, &batch.meta_map, TransportError::DeadlineExceeded { target });
        }
        Err(_outer_elapsed) => {
            tracing::trace!(node = target, "heartbeat send abandoned after outer deadline");
        }
    }
}
