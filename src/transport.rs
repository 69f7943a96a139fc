//! The RPC transport collaborator (§6.1, §6.2).
//!
//! Grounded on the teacher's `RaftNetwork` trait (`send_append_entries`,
//! `send_install_snapshot`), generalized with an additional pipelining surface
//! (`append_entries_pipeline`) the teacher does not need because it never runs without
//! awaiting each response; this crate's Pipeline Sender/Decoder split (§4.4, §4.5)
//! requires it.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::log::LogEntry;
use crate::log::LogId;
use crate::NodeId;

/// `{ term, leaderId, prevLogIndex, prevLogTerm, entries[], leaderCommitIndex }`
/// (§6.2). A heartbeat is the empty form: `prev_log_id` at the sentinel, no entries,
/// `leader_commit = 0`. `leader_id` carries the leader's address already encoded via
/// [`Transport::encode_peer`] (§6.1), not a raw [`NodeId`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: Vec<u8>,
    pub prev_log_id: LogId,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

impl AppendEntriesRequest {
    /// Build the empty form used by the Heartbeater (§4.6): no prev fields, no
    /// entries, no commit index. `leader_id` must already be encoded via
    /// [`Transport::encode_peer`].
    pub fn heartbeat(term: u64, leader_id: Vec<u8>) -> Self {
        Self {
            term,
            leader_id,
            prev_log_id: LogId::sentinel(),
            entries: Vec::new(),
            leader_commit: 0,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

impl crate::MessageSummary for AppendEntriesRequest {
    fn summary(&self) -> String {
        format!(
            "AppendEntries{{term:{}, prev:{}, n_entries:{}, leader_commit:{}}}",
            self.term,
            self.prev_log_id,
            self.entries.len(),
            self.leader_commit
        )
    }
}

/// `{ term, lastLog, success }` (§6.2). `last_log` is the follower's last log index,
/// consulted on rejection to accelerate probing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub last_log: u64,
    pub success: bool,
}

/// `{ term, leaderId, lastLogIndex, lastLogTerm, peers, size }` followed by a
/// `size`-byte payload stream (§6.2). `leader_id` carries the leader's address already
/// encoded via [`Transport::encode_peer`] (§6.1), not a raw [`NodeId`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: u64,
    pub leader_id: Vec<u8>,
    pub last_log_id: LogId,
    pub peers: Vec<NodeId>,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: u64,
    pub success: bool,
}

/// One decoded pipeline acknowledgment: the request as submitted, the response, and
/// the submission timestamp, for latency accounting (§4.5 step 1).
pub struct PipelineAck {
    pub request: AppendEntriesRequest,
    pub response: AppendEntriesResponse,
    pub submitted_at: Instant,
}

/// The consumer half of a [`Pipeline`]: yields acknowledgments strictly in the order
/// their requests were submitted (§4.5 "Ordering invariant"). Split out from the
/// sending half so the Pipeline Sender and Pipeline Decoder (§4.4, §4.5) can each own
/// one half and run as independent tasks, per the spec's "spawns the Pipeline Decoder
/// over it" wording in §4.4.
#[async_trait]
pub trait PipelineConsumer: Send + 'static {
    /// Receive the next acknowledgment, or `None` once the pipeline has been closed
    /// and fully drained.
    async fn recv(&mut self) -> Option<PipelineAck>;
}

/// A transport-level pipeline for a single peer (§6.1). `send` is non-blocking
/// submission; `take_consumer` hands off the single-consumer stream exactly once;
/// `close` terminates the pipeline, draining any remaining acknowledgments.
#[async_trait]
pub trait Pipeline: Send {
    type Consumer: PipelineConsumer;

    /// Submit a request without awaiting its response.
    async fn send(&mut self, req: AppendEntriesRequest) -> Result<(), TransportError>;

    /// Take ownership of the consumer half. Must be called exactly once per pipeline;
    /// the Pipeline Sender calls this immediately after opening the pipeline and hands
    /// the result to a spawned Pipeline Decoder task.
    fn take_consumer(&mut self) -> Self::Consumer;

    /// Terminate the pipeline, draining remaining acknowledgments on the wire.
    async fn close(&mut self);
}

/// The RPC transport collaborator (§6.1).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type SnapshotReader: AsyncRead + Send + Unpin + 'static;
    type Pipeline: Pipeline;

    /// Encode a peer's address for use as `leader_id` / request metadata.
    fn encode_peer(&self, peer: NodeId) -> Vec<u8>;

    /// Synchronous AppendEntries RPC.
    async fn append_entries(
        &self,
        peer: NodeId,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, TransportError>;

    /// Synchronous InstallSnapshot RPC; `reader` is consumed to completion on the
    /// wire.
    async fn install_snapshot(
        &self,
        peer: NodeId,
        req: InstallSnapshotRequest,
        reader: Self::SnapshotReader,
    ) -> Result<InstallSnapshotResponse, TransportError>;

    /// Open a pipelined AppendEntries channel to `peer`.
    async fn append_entries_pipeline(&self, peer: NodeId) -> Result<Self::Pipeline, TransportError>;
}
