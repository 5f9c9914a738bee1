//! The heartbeat manager: the top-level orchestrator that owns the
//! timer, the registry, the shutdown gate, and the mutex serializing
//! registry mutations against dispatch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HeartbeatConfig;
use crate::dispatch;
use crate::group::ConsensusGroup;
use crate::planner;
use crate::registry::GroupRegistry;
use crate::transport::Transport;
use crate::types::GroupId;

/// Owns one node's view of the heartbeat subsystem: the consensus-group
/// registry, the periodic dispatch loop, and the machinery to start and
/// stop it cleanly.
///
/// The three-layer nesting of gate, mutex, and dispatch is realized here
/// as: the dispatch loop checks
/// `gate.is_cancelled()` before each tick, then locks `registry` for the
/// duration of planning and sending. `register_group`/`deregister_group`
/// lock the same mutex, so they can never race a dispatch in flight.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<Mutex<GroupRegistry>>,
    gate: CancellationToken,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatManager {
    pub fn new(config: HeartbeatConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            registry: Arc::new(Mutex::new(GroupRegistry::new())),
            gate: CancellationToken::new(),
            loop_handle: Mutex::new(None),
        }
    }

    /// Open the gate, trigger an immediate dispatch, and arm the timer.
    ///
    /// Idempotent precondition: must not have been `stop`ped already.
    #[tracing::instrument(level = "debug", skip(self), fields(node = self.config.self_node_id))]
    pub async fn start(&self) {
        if self.gate.is_cancelled() {
            panic!("HeartbeatManager::start called after stop");
        }

        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let gate = self.gate.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut first = true;
            loop {
                if !first {
                    tokio::select! {
                        _ = gate.cancelled() => break,
                        _ = tokio::time::sleep(config.heartbeat_interval) => {}
                    }
                }
                first = false;

                if gate.is_cancelled() {
                    break;
                }

                let guard = registry.lock().await;
                let now = tokio::time::Instant::now();
                let (batches, reconnect) = planner::plan_tick(&guard, config.heartbeat_interval, config.self_node_id, now);

                let dispatch_fut = dispatch::run(
                    &transport,
                    &guard,
                    batches,
                    reconnect,
                    config.self_node_id,
                    config.heartbeat_timeout,
                    config.heartbeat_interval,
                );

                if AssertUnwindSafe(dispatch_fut).catch_unwind().await.is_err() {
                    tracing::warn!("heartbeat dispatch cycle panicked; timer will still be re-armed");
                }
                drop(guard);

                if gate.is_cancelled() {
                    break;
                }
            }
        });

        *self.loop_handle.lock().await = Some(handle);
    }

    /// Cancel the timer and close the gate; resolves only after the
    /// in-flight dispatch (if any) finishes. After this call, further
    /// register/deregister calls are rejected.
    #[tracing::instrument(level = "debug", skip(self), fields(node = self.config.self_node_id))]
    pub async fn stop(&self) {
        self.gate.cancel();
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Insert `handle` into the registry. Fails fatally if the group is
    /// already present.
    pub async fn register_group(&self, handle: Arc<dyn ConsensusGroup>) {
        if self.gate.is_cancelled() {
            tracing::warn!(group = handle.group(), "register_group rejected: manager is stopped");
            return;
        }
        let mut registry = self.registry.lock().await;
        registry.insert(handle);
    }

    /// Remove the group named `id` from the registry. Fails fatally if
    /// absent.
    pub async fn deregister_group(&self, id: GroupId) {
        if self.gate.is_cancelled() {
            tracing::warn!(group = id, "deregister_group rejected: manager is stopped");
            return;
        }
        let mut registry = self.registry.lock().await;
        registry.erase(id);
    }

    /// Run a single dispatch cycle synchronously, outside of the periodic
    /// timer. Exposed for tests and tools that want to drive exactly one
    /// tick without waiting on the interval.
    pub async fn tick_once(&self) {
        let guard = self.registry.lock().await;
        let now = tokio::time::Instant::now();
        let (batches, reconnect) = planner::plan_tick(&guard, self.config.heartbeat_interval, self.config.self_node_id, now);
        dispatch::run(
            &self.transport,
            &guard,
            batches,
            reconnect,
            self.config.self_node_id,
            self.config.heartbeat_timeout,
            self.config.heartbeat_interval,
        )
        .await;
    }
}
