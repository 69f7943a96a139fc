//! Leader-side log replication core for a Raft consensus node.
//!
//! This crate implements the per-follower replication subsystem a Raft leader uses to
//! bring a peer's log up to date, keep it there, and detect loss of leadership. It does
//! not implement leader election, the state machine, the log/snapshot stores, or the RPC
//! transport: those are external collaborators, modeled here only as traits (see
//! [`log`], [`snapshot`], [`transport`], [`node`]).

pub mod config;
pub mod error;
pub mod inflight;
pub mod log;
pub mod metrics;
pub mod node;
pub mod replication;
pub mod snapshot;
pub mod transport;

pub use config::Config;
pub use config::ConfigBuilder;
pub use log::EntryPayload;
pub use log::LogEntry;
pub use log::LogId;
pub use metrics::ReplicationMetrics;
pub use metrics::ReplicationState;
pub use replication::FollowerReplicator;

/// The identity of a Raft node, opaque to this crate beyond being orderable and
/// cheaply cloneable. Hosts typically use a cluster-assigned integer or a network
/// address newtype.
pub type NodeId = u64;

/// A trait implemented by a type which is used to summarize a value for logging.
///
/// Grounded on the teacher's `MessageSummary`, used so `tracing` call sites can log a
/// short, human-legible description of a request/response without requiring `Debug` on
/// application payload types.
pub trait MessageSummary {
    /// Return a short summary of `self`.
    fn summary(&self) -> String;
}
