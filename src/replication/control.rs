//! The Control Loop (§4.1).
//!
//! Runs until `stopSignal` delivers, then performs a best-effort drain and exits.
//! Alternates between STANDARD (safe catch-up, driven here directly) and PIPELINE
//! (handed off to the Pipeline Sender) based on the `allow_pipeline` hint left behind
//! by the last successful round.

use tokio::sync::oneshot;

use crate::log::LogStore;
use crate::metrics::ReplicationState;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::Transport;

use super::jittered;
use super::pipeline::PipelineExit;
use super::Replicator;

pub(super) async fn run_control_loop<T, L, S, N>(
    replicator: Replicator<T, L, S, N>,
    mut stop_rx: oneshot::Receiver<u64>,
) where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    // An initial round establishes contact immediately rather than waiting out a full
    // commit-timeout tick, the way the teacher's `main()` performs an initial
    // `send_append_entries` before entering its inner loop.
    if replicator.replicate_to(replicator.node.last_log_index()).await {
        replicator.publish_metrics(ReplicationState::Shutdown).await;
        return;
    }

    loop {
        if replicator.state.lock().await.allow_pipeline {
            match super::pipeline::run_pipeline_sender(&replicator, &mut stop_rx).await {
                PipelineExit::Stopped | PipelineExit::StepDown => {
                    replicator.state.lock().await.allow_pipeline = false;
                    replicator.publish_metrics(ReplicationState::Shutdown).await;
                    return;
                }
                PipelineExit::Aborted => {
                    replicator.state.lock().await.allow_pipeline = false;
                    continue;
                }
            }
        }

        let should_stop = tokio::select! {
            biased;

            drain = &mut stop_rx => {
                let drain_to = drain.unwrap_or(0);
                if drain_to > 0 {
                    replicator.replicate_to(drain_to).await;
                }
                true
            }

            _ = replicator.trigger.notified() => {
                replicator.replicate_to(replicator.node.last_log_index()).await
            }

            _ = tokio::time::sleep(jittered(replicator.config.commit_timeout)) => {
                replicator.replicate_to(replicator.node.last_log_index()).await
            }
        };

        if should_stop {
            replicator.publish_metrics(ReplicationState::Shutdown).await;
            return;
        }
    }
}
