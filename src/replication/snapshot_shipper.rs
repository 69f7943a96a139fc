//! The Snapshot Shipper (§4.3).

use crate::log::LogId;
use crate::log::LogStore;
use crate::metrics::ReplicationState;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::InstallSnapshotRequest;
use crate::transport::Transport;

use super::Replicator;

/// The outcome of one `sendLatestSnapshot()` attempt (§4.3). `Continue` means control
/// returns to the Catch-Up Sender's step 8 to resume or resend.
pub(super) enum ShipOutcome {
    Stop,
    Error,
    Continue,
}

impl<T, L, S, N> Replicator<T, L, S, N>
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    /// `sendLatestSnapshot() -> (stop, err)` (§4.3), collapsed into a three-way
    /// outcome: `Stop` (step-down observed), `Error` (no progress, caller aborts the
    /// round without stopping), or `Continue` (resume the caller's loop).
    #[tracing::instrument(level = "trace", skip(self), fields(target = self.peer))]
    pub(super) async fn ship_snapshot(&self) -> ShipOutcome {
        self.publish_metrics(ReplicationState::Snapshotting).await;

        let metas = match self.snapshot_store.list().await {
            Ok(metas) => metas,
            Err(err) => {
                tracing::warn!(error = %err, target = self.peer, "failed to list snapshots");
                return ShipOutcome::Error;
            }
        };
        let meta = match metas.into_iter().next() {
            Some(meta) => meta,
            None => {
                tracing::warn!(target = self.peer, "no snapshots available");
                return ShipOutcome::Error;
            }
        };

        // `reader` is released when it goes out of scope at the end of this function,
        // on every exit path (success, rejection, transport error, or step-down).
        let (meta, reader) = match self.snapshot_store.open(&meta.id).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, target = self.peer, "failed to open snapshot");
                return ShipOutcome::Error;
            }
        };

        let req = InstallSnapshotRequest {
            term: self.term,
            leader_id: self.transport.encode_peer(self.node.local_addr()),
            last_log_id: LogId::new(meta.term, meta.index),
            peers: meta.peers.clone(),
            size: meta.size,
        };

        let resp = match self.transport.install_snapshot(self.peer, req, reader).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %err, target = self.peer, "install_snapshot transport error");
                self.state.lock().await.failures += 1;
                return ShipOutcome::Error;
            }
        };

        if resp.term > self.term {
            self.drain_verify(false).await;
            self.step_down(resp.term);
            return ShipOutcome::Stop;
        }

        self.touch_last_contact().await;

        if resp.success {
            let mut st = self.state.lock().await;
            st.inflight.commit_range(st.match_index.index + 1, meta.index);
            st.match_index = LogId::new(meta.term, meta.index);
            st.next_index = meta.index + 1;
            st.failures = 0;
            drop(st);
            self.publish_metrics(ReplicationState::Replicating).await;
            self.drain_verify(true).await;
        } else {
            // §9 Open Question (b): on rejection only `failures` is incremented; no
            // index adjustment is specified, so none is made here.
            self.state.lock().await.failures += 1;
        }

        ShipOutcome::Continue
    }
}
