//! The host-node accessor collaborator (§6.1).

use crate::log::LogId;

/// Read-only accessors the replication core needs from the surrounding leader node.
/// Grounded on the teacher's direct field access into `RaftCore` (`self.core.*`),
/// generalized into a trait because the state machine, election logic, and commit-index
/// quorum computation that own this state are explicitly out of scope (§1).
pub trait NodeHandle: Send + Sync + 'static {
    /// The index of the most recently appended log entry.
    fn last_log_index(&self) -> u64;

    /// The highest log index known to be committed cluster-wide.
    fn commit_index(&self) -> u64;

    /// The index covered by the most recent snapshot, or 0 if none exists.
    fn last_snapshot_index(&self) -> u64;

    /// The term of the entry at `last_snapshot_index`.
    fn last_snapshot_term(&self) -> u64;

    /// This node's own address, used as `leaderId` in requests.
    fn local_addr(&self) -> crate::NodeId;

    /// The (term, index) pair summarizing the latest snapshot, built from
    /// [`NodeHandle::last_snapshot_index`] / [`NodeHandle::last_snapshot_term`].
    fn last_snapshot_log_id(&self) -> LogId {
        LogId::new(self.last_snapshot_term(), self.last_snapshot_index())
    }
}
