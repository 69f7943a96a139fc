//! The Catch-Up Sender (§4.2).

use crate::error::LogStoreError;
use crate::log::LogEntry;
use crate::log::LogId;
use crate::log::LogStore;
use crate::metrics::ReplicationState;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::AppendEntriesRequest;
use crate::transport::Transport;

use super::snapshot_shipper::ShipOutcome;
use super::Replicator;

/// The outcome of resolving `(prevLogIndex, prevLogTerm)` for the next batch (§4.2
/// step 2).
enum PrevEntry {
    Found(LogId),
    NeedsSnapshot,
    Aborted,
}

/// The outcome of assembling one batch starting at `nextIndex` (§4.2 steps 2–3),
/// shared by the Catch-Up Sender and the Pipeline Sender (§4.4, which "mirrors steps
/// 2–3 using a local cursor").
pub(super) enum BatchOutcome {
    Ready {
        prev: LogId,
        entries: Vec<LogEntry>,
        batch_end: LogId,
    },
    NeedsSnapshot,
    Aborted,
}

impl<T, L, S, N> Replicator<T, L, S, N>
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    /// `replicateTo(lastIndex) -> shouldStop` (§4.2). Always runs at least one round
    /// (even a round with an empty batch, functioning as a consistency probe), then
    /// repeats while `nextIndex <= lastIndex`, until a terminal condition (step-down)
    /// occurs.
    #[tracing::instrument(level = "trace", skip(self), fields(target = self.peer, last_index))]
    pub(crate) async fn replicate_to(&self, last_index: u64) -> bool {
        loop {
            // Step 1: backoff gate.
            let failures = self.state.lock().await.failures;
            if failures > 0 {
                let delay = self.config.backoff(failures);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.notified() => return false,
                }
            }

            let next_index = self.state.lock().await.next_index;
            self.publish_metrics(ReplicationState::Probing).await;

            // Steps 2–3: previous-entry resolution and batch assembly.
            let (prev, entries, batch_end) = match self.prepare_batch(next_index, last_index).await {
                BatchOutcome::Ready { prev, entries, batch_end } => (prev, entries, batch_end),
                BatchOutcome::NeedsSnapshot => match self.ship_snapshot().await {
                    ShipOutcome::Stop => return true,
                    ShipOutcome::Error => return false,
                    ShipOutcome::Continue => {
                        if self.state.lock().await.next_index > last_index {
                            return false;
                        }
                        continue;
                    }
                },
                BatchOutcome::Aborted => return false,
            };

            // Step 4: RPC.
            let req = AppendEntriesRequest {
                term: self.term,
                leader_id: self.transport.encode_peer(self.node.local_addr()),
                prev_log_id: prev,
                entries,
                leader_commit: self.node.commit_index(),
            };
            if !req.is_heartbeat() {
                self.state.lock().await.inflight.record_sent(next_index, batch_end.index);
            }
            tracing::trace!(target = self.peer, req = %crate::MessageSummary::summary(&req), "sending append_entries");
            let resp = match self.transport.append_entries(self.peer, req).await {
                Ok(resp) => resp,
                Err(err) => {
                    tracing::warn!(error = %err, target = self.peer, "append_entries transport error");
                    self.state.lock().await.failures += 1;
                    return false;
                }
            };

            // Step 5: term check.
            if resp.term > self.term {
                self.drain_verify(false).await;
                self.step_down(resp.term);
                return true;
            }

            self.touch_last_contact().await;

            if resp.success {
                // Step 6: success path.
                let mut st = self.state.lock().await;
                st.inflight.commit_range(next_index, batch_end.index);
                st.match_index = batch_end;
                st.next_index = batch_end.index + 1;
                st.failures = 0;
                st.allow_pipeline = true;
                drop(st);
                self.publish_metrics(ReplicationState::Replicating).await;
                self.drain_verify(true).await;
            } else {
                // Step 7: rejection path.
                let mut st = self.state.lock().await;
                let decremented = st.next_index.saturating_sub(1);
                let new_next = decremented.min(resp.last_log + 1).max(1);
                st.next_index = new_next;
                st.match_index = LogId::new(st.match_index.term, new_next - 1);
                st.failures += 1;
                st.allow_pipeline = false;
            }

            // Step 8: continuation.
            if self.state.lock().await.next_index > last_index {
                return false;
            }
        }
    }

    /// `(prevLogIndex, prevLogTerm)` resolution followed by batch assembly, shared by
    /// the Catch-Up Sender (above) and the Pipeline Sender (§4.4).
    pub(super) async fn prepare_batch(&self, next_index: u64, last_index: u64) -> BatchOutcome {
        let prev = match self.resolve_prev_entry(next_index).await {
            PrevEntry::Found(id) => id,
            PrevEntry::NeedsSnapshot => return BatchOutcome::NeedsSnapshot,
            PrevEntry::Aborted => return BatchOutcome::Aborted,
        };

        let stop_index = last_index.min(next_index + self.config.max_append_entries - 1);
        let entries = match self.log_store.get_log_range(next_index, stop_index).await {
            Ok(entries) => entries,
            Err(LogStoreError::NotFound) => return BatchOutcome::NeedsSnapshot,
            Err(err) => {
                tracing::warn!(error = %err, target = self.peer, "log store error fetching batch, aborting round");
                return BatchOutcome::Aborted;
            }
        };
        // An empty batch (nextIndex already beyond lastIndex) is a valid consistency
        // probe, not an error: treat the previous entry as the batch end so the round
        // is a no-op on success.
        let batch_end = entries.last().map(|e| e.log_id).unwrap_or(prev);

        BatchOutcome::Ready { prev, entries, batch_end }
    }

    async fn resolve_prev_entry(&self, next_index: u64) -> PrevEntry {
        if next_index == 1 {
            return PrevEntry::Found(LogId::sentinel());
        }
        let snapshot_log_id = self.node.last_snapshot_log_id();
        if next_index - 1 == snapshot_log_id.index {
            return PrevEntry::Found(snapshot_log_id);
        }
        match self.log_store.get_log(next_index - 1).await {
            Ok(entry) => PrevEntry::Found(entry.log_id),
            Err(LogStoreError::NotFound) => PrevEntry::NeedsSnapshot,
            Err(err) => {
                tracing::warn!(error = %err, target = self.peer, "log store error resolving prev entry, aborting round");
                PrevEntry::Aborted
            }
        }
    }
}
