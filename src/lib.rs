//! Leader heartbeat dispatch and reply routing for a multi-group Raft
//! implementation: given a registry of consensus groups resident in one
//! execution context, periodically batches per-follower append-entries
//! probes by destination node, sends them, and routes replies (or their
//! absence) back into the originating groups.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod manager;
pub mod planner;
pub mod registry;
pub mod router;
pub mod transport;
pub mod types;

pub use async_trait::async_trait;

pub use config::HeartbeatConfig;
pub use error::TransportError;
pub use group::AppendEntriesOutcome;
pub use group::ConsensusGroup;
pub use manager::HeartbeatManager;
pub use registry::GroupRegistry;
pub use transport::HeartbeatOpts;
pub use transport::Transport;
pub use types::FollowerReqMeta;
pub use types::GroupId;
pub use types::HBMeta;
pub use types::HBPreamble;
pub use types::HBReply;
pub use types::HBReplyEntry;
pub use types::HBRequest;
pub use types::NodeHeartbeat;
pub use types::NodeId;
pub use types::Ntp;
pub use types::Seq;
pub use types::VNode;
