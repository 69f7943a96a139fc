//! The Heartbeater (§4.6).
//!
//! Runs independently of replication so that slow log I/O cannot delay heartbeats.
//! Never mutates `nextIndex`/`matchIndex`/`failures` as part of its own local-failure
//! accounting — transport errors here only drive the heartbeater's own backoff sleep.
//! It does, however, participate in the "any RPC" term check of §7 ("Response
//! `term > request.term` | any RPC | ... signal step-down"): §8 scenario 4 is explicit
//! that a heartbeat response carrying a newer term causes step-down.

use crate::log::LogStore;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::AppendEntriesRequest;
use crate::transport::Transport;

use super::jittered;
use super::Replicator;

pub(super) async fn run_heartbeater<T, L, S, N>(replicator: Replicator<T, L, S, N>)
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    let mut local_failures: u64 = 0;
    loop {
        let sub_interval = replicator.config.heartbeat_interval / 10;
        tokio::select! {
            _ = replicator.heartbeat_notify.notified() => {}
            _ = tokio::time::sleep(jittered(sub_interval)) => {}
            _ = replicator.shutdown.notified() => return,
        }

        let leader_id = replicator.transport.encode_peer(replicator.node.local_addr());
        let req = AppendEntriesRequest::heartbeat(replicator.term, leader_id);
        match replicator.transport.append_entries(replicator.peer, req).await {
            Ok(resp) => {
                if resp.term > replicator.term {
                    replicator.drain_verify(false).await;
                    replicator.step_down(resp.term);
                    return;
                }
                local_failures = 0;
                replicator.touch_last_contact().await;
                replicator.drain_verify(resp.success).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, target = replicator.peer, "heartbeat transport error");
                local_failures += 1;
                let delay = replicator.config.backoff(local_failures);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = replicator.shutdown.notified() => return,
                }
            }
        }
    }
}
