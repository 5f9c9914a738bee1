//! The capability set the heartbeat core requires from a consensus-group
//! instance. The core calls no other method on a group handle.

use tokio::time::Instant;

use crate::error::TransportError;
use crate::types::GroupId;
use crate::types::HBPreamble;
use crate::types::HBReplyEntry;
use crate::types::NodeId;
use crate::types::Ntp;
use crate::types::Seq;
use crate::types::VNode;

/// The outcome of one follower's heartbeat, as seen by the group that
/// originated it.
pub type AppendEntriesOutcome = Result<HBReplyEntry, TransportError>;

/// The facade a consensus-group instance must expose so the heartbeat core
/// can plan, send, and account for its heartbeats.
///
/// Implementations own their own interior mutability and must be `Send +
/// Sync`: the registry holds `Arc<dyn ConsensusGroup>` and the core calls
/// these methods from concurrently running dispatch futures. Note that the
/// per-follower suppression flag is a single-writer datum under
/// the core's own serialization guarantees; a multi-threaded group
/// implementation still needs its own lock or atomics to make these methods
/// safe to call from arbitrary tasks.
pub trait ConsensusGroup: Send + Sync {
    /// Whether heartbeats should be emitted for this group in the current term.
    fn is_leader(&self) -> bool;

    /// The local leader's identity for this group.
    fn self_vnode(&self) -> VNode;

    /// Enumerate the current voter set, including self. Must not suspend or
    /// perform I/O: the planner relies on this being a pure, synchronous
    /// walk over a coherent snapshot.
    fn for_each_voter(&self, f: &mut dyn FnMut(VNode));

    /// The append-entries preamble as of now.
    fn meta(&self) -> HBPreamble;

    /// True if a prior in-flight heartbeat or replication RPC to this
    /// follower has not yet completed.
    fn heartbeats_suppressed(&self, vnode: VNode) -> bool;

    /// When the most recent successful append (heartbeat or data) to this
    /// follower was observed.
    fn last_append_timestamp(&self, vnode: VNode) -> Instant;

    /// Allocate the next per-follower send sequence number. Must be
    /// strictly increasing for the lifetime of the group handle.
    fn next_follower_sequence(&self, vnode: VNode) -> Seq;

    /// Set or clear the suppression flag for `vnode`.
    fn update_suppress_heartbeats(&self, vnode: VNode, seq: Seq, on: bool);

    /// True when consecutive failures against `vnode` exceed a policy
    /// threshold and the transport should be asked to reconnect.
    fn should_reconnect_follower(&self, vnode: VNode) -> bool;

    /// Record success or failure of a heartbeat RPC for reconnect heuristics.
    fn update_heartbeat_status(&self, vnode: VNode, ok: bool);

    /// Integrate a reply (or failure) for `seq`/`dirty_offset`, allowing the
    /// group to discard stale replies superseded by later sends.
    fn process_append_entries_reply(
        &self,
        node: NodeId,
        outcome: AppendEntriesOutcome,
        seq: Seq,
        dirty_offset: u64,
    );

    /// Bump this group's own "heartbeat request error" counter. Called
    /// exactly once per transport failure routed to this group.
    fn record_heartbeat_request_error(&self);

    /// This group's identifier.
    fn group(&self) -> GroupId;

    /// This group's subject matter, for diagnostics only.
    fn ntp(&self) -> Ntp;
}
