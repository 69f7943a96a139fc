//! The Pipeline Sender (§4.4) and Pipeline Decoder (§4.5).
//!
//! Entered once the Catch-Up Sender leaves a round with `allow_pipeline` set. The
//! sender submits batches without waiting for responses, tracking its own local
//! `cursor_next` rather than the shared `nextIndex`; a separately spawned decoder task
//! consumes acknowledgments in submission order and is the sole writer of
//! `nextIndex`/`matchIndex`/`inflight` while PIPELINE mode is active (§5 "Shared
//! resources").

use tokio::sync::oneshot;

use crate::log::LogStore;
use crate::metrics::ReplicationState;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::AppendEntriesRequest;
use crate::transport::Pipeline;
use crate::transport::PipelineAck;
use crate::transport::PipelineConsumer;
use crate::transport::Transport;

use super::catchup::BatchOutcome;
use super::jittered;
use super::Replicator;

/// Why the Pipeline Sender returned control to the Control Loop.
pub(super) enum PipelineExit {
    /// `stopSignal` fired; the whole replicator is shutting down.
    Stopped,
    /// A newer term was observed; the host leader is stepping down.
    StepDown,
    /// The decoder rejected a batch or a submission failed; revert to STANDARD and
    /// let the Catch-Up Sender resynchronize.
    Aborted,
}

/// Why the Pipeline Decoder stopped consuming acknowledgments.
enum DecoderExit {
    Aborted,
    StepDown,
}

pub(super) async fn run_pipeline_sender<T, L, S, N>(
    replicator: &Replicator<T, L, S, N>,
    stop_rx: &mut oneshot::Receiver<u64>,
) -> PipelineExit
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    let mut pipeline = match replicator.transport.append_entries_pipeline(replicator.peer).await {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::warn!(error = %err, target = replicator.peer, "failed to open pipeline");
            replicator.state.lock().await.failures += 1;
            return PipelineExit::Aborted;
        }
    };

    let consumer = pipeline.take_consumer();
    let (finish_tx, mut finish_rx) = oneshot::channel::<DecoderExit>();
    let decoder_replicator = replicator.clone();
    let decoder_handle = tokio::spawn(async move {
        let exit = run_pipeline_decoder(decoder_replicator, consumer).await;
        let _ = finish_tx.send(exit);
    });

    let mut cursor_next = replicator.state.lock().await.next_index;
    let exit;

    loop {
        tokio::select! {
            biased;

            decoder_exit = &mut finish_rx => {
                exit = match decoder_exit {
                    Ok(DecoderExit::StepDown) => PipelineExit::StepDown,
                    Ok(DecoderExit::Aborted) | Err(_) => PipelineExit::Aborted,
                };
                break;
            }

            drain = &mut *stop_rx => {
                let drain_to = drain.unwrap_or(0);
                if drain_to > 0 {
                    pipeline_send(replicator, &mut pipeline, &mut cursor_next, drain_to).await;
                }
                exit = PipelineExit::Stopped;
                break;
            }

            _ = replicator.trigger.notified() => {
                let last_index = replicator.node.last_log_index();
                if pipeline_send(replicator, &mut pipeline, &mut cursor_next, last_index).await {
                    exit = PipelineExit::Aborted;
                    break;
                }
            }

            _ = tokio::time::sleep(jittered(replicator.config.commit_timeout)) => {
                let last_index = replicator.node.last_log_index();
                if pipeline_send(replicator, &mut pipeline, &mut cursor_next, last_index).await {
                    exit = PipelineExit::Aborted;
                    break;
                }
            }
        }
    }

    pipeline.close().await;
    let _ = decoder_handle.await;

    exit
}

/// `pipelineSend(cursorNext, lastIndex) -> stop` (§4.4). Mirrors the Catch-Up Sender's
/// steps 2–3 against `cursor_next` instead of the shared `nextIndex`, then submits
/// without awaiting a response. Returns `true` when the caller should abandon PIPELINE
/// mode entirely (log-not-found, log error, or submission failure).
async fn pipeline_send<T, L, S, N>(
    replicator: &Replicator<T, L, S, N>,
    pipeline: &mut T::Pipeline,
    cursor_next: &mut u64,
    last_index: u64,
) -> bool
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    if *cursor_next > last_index {
        return false;
    }

    let (prev, entries, batch_end) = match replicator.prepare_batch(*cursor_next, last_index).await {
        BatchOutcome::Ready { prev, entries, batch_end } => (prev, entries, batch_end),
        BatchOutcome::NeedsSnapshot | BatchOutcome::Aborted => return true,
    };

    let req = AppendEntriesRequest {
        term: replicator.term,
        leader_id: replicator.transport.encode_peer(replicator.node.local_addr()),
        prev_log_id: prev,
        entries,
        leader_commit: replicator.node.commit_index(),
    };
    if !req.is_heartbeat() {
        replicator.state.lock().await.inflight.record_sent(*cursor_next, batch_end.index);
    }
    tracing::trace!(target = replicator.peer, req = %crate::MessageSummary::summary(&req), "pipelining append_entries");

    match pipeline.send(req).await {
        Ok(()) => {
            *cursor_next = batch_end.index + 1;
            false
        }
        Err(err) => {
            tracing::warn!(error = %err, target = replicator.peer, "pipeline submission error");
            true
        }
    }
}

/// Consumes acknowledgments strictly in submission order (§4.5 "Ordering invariant"),
/// the sole writer of `nextIndex`/`matchIndex`/`inflight` while this task runs.
async fn run_pipeline_decoder<T, L, S, N, C>(replicator: Replicator<T, L, S, N>, mut consumer: C) -> DecoderExit
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
    C: PipelineConsumer,
{
    while let Some(ack) = consumer.recv().await {
        let PipelineAck {
            request,
            response,
            submitted_at,
        } = ack;

        if response.term > replicator.term {
            replicator.drain_verify(false).await;
            replicator.step_down(response.term);
            return DecoderExit::StepDown;
        }

        replicator.touch_last_contact().await;

        if !response.success {
            replicator.drain_verify(false).await;
            let mut st = replicator.state.lock().await;
            st.failures += 1;
            st.allow_pipeline = false;
            drop(st);
            return DecoderExit::Aborted;
        }

        if let Some(last_entry) = request.entries.last() {
            let batch_end = last_entry.log_id;
            let mut st = replicator.state.lock().await;
            st.inflight.commit_range(request.prev_log_id.index + 1, batch_end.index);
            st.match_index = batch_end;
            st.next_index = batch_end.index + 1;
            st.failures = 0;
            drop(st);
            replicator.publish_metrics(ReplicationState::Replicating).await;
        }

        tracing::trace!(
            target = replicator.peer,
            latency_ms = submitted_at.elapsed().as_millis(),
            "pipeline ack",
        );

        replicator.drain_verify(true).await;
    }

    DecoderExit::Aborted
}
