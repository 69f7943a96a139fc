//! Per-peer replication metrics (§4.10, §6.3).
//!
//! Grounded on the teacher's `replication::ReplicationMetrics` plus its
//! `watch::channel(RaftMetrics::new_initial(id))` publication pattern in `raft.rs`: each
//! [`crate::replication::FollowerReplicator`] owns a `watch::Sender<ReplicationMetrics>`
//! and the host node holds the paired `watch::Receiver` for aggregation. This crate does
//! not depend on a metrics-exporter crate (sink wiring is out of scope, §1); the
//! per-RPC latency and batch-size counters of §6.3 are instead emitted as structured
//! `tracing` events that a host-side subscriber can turn into counters/histograms.

use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;

use crate::log::LogId;
use crate::NodeId;

/// The replication state of a single follower, as observed from outside the
/// replicator. Named `ReplicationState` (rather than the teacher's `TargetReplState`)
/// to avoid colliding with this crate's own STANDARD/PIPELINE control-loop states
/// (§4.1), which are a distinct concept: a replicator can be `Replicating` while its
/// control loop is in either STANDARD or PIPELINE mode.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReplicationState {
    /// Catching the follower up via the Catch-Up Sender.
    Probing,
    /// Fully caught up; the control loop is free to enter PIPELINE mode.
    Replicating,
    /// Streaming a snapshot to a far-behind follower.
    Snapshotting,
    /// The replicator has torn down.
    Shutdown,
}

/// A point-in-time snapshot of one follower's replication progress.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicationMetrics {
    pub target: NodeId,
    pub matched: LogId,
    pub state: ReplicationState,
    /// Milliseconds elapsed since the last successful RPC response, sampled at the
    /// time this snapshot was published, or `None` if the peer has never responded.
    /// Represented as `u128` millis rather than `Instant` so the type remains
    /// `Serialize`; this is an age, not a wall-clock timestamp, so it is only
    /// meaningful at the moment it was published.
    pub last_contact_millis: Option<u128>,
}

impl ReplicationMetrics {
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            matched: LogId::sentinel(),
            state: ReplicationState::Probing,
            last_contact_millis: None,
        }
    }
}

/// Milliseconds elapsed from `reference` (a `lastContact` timestamp) to `now`, the
/// form stored in [`ReplicationMetrics::last_contact_millis`]. Hosts that need
/// wall-clock timestamps should instead pair last-contact observations with their own
/// `SystemTime` sampling; this crate only needs a monotonic, comparable value for
/// liveness checks.
pub fn millis_since(reference: Instant, now: Instant) -> u128 {
    now.saturating_duration_since(reference).as_millis()
}
