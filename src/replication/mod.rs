//! The per-follower replication core (§2–§5).
//!
//! For every peer a leader needs to replicate to, the leader spawns one
//! [`FollowerReplicator`]. The replicator owns a Control Loop task (§4.1) and an
//! independent Heartbeater task (§4.6); while caught up it additionally spawns a
//! Pipeline Decoder task (§4.5) for the duration of PIPELINE mode. All three share a
//! small set of synchronized fields (`ReplicatorCore`) behind `Arc` + `tokio::sync`
//! primitives, grounded on the teacher's `ReplicationCore`/`ReplicationStream` split
//! (`replication/mod.rs`), generalized from the teacher's single-task design because
//! this spec's pipelining model requires a genuinely separate decoder task (§4.4–§4.5).

mod catchup;
mod control;
mod heartbeat;
mod pipeline;
mod snapshot_shipper;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::Config;
use crate::inflight::InflightLedger;
use crate::log::LogId;
use crate::log::LogStore;
use crate::metrics::ReplicationMetrics;
use crate::metrics::ReplicationState;
use crate::node::NodeHandle;
use crate::snapshot::SnapshotStore;
use crate::transport::Transport;
use crate::NodeId;

/// A notification that this replicator has observed a peer report a term newer than
/// its own, and the host leader should step down (§3 `stepDownSignal`, §7).
#[derive(Clone, Copy, Debug)]
pub struct StepDownEvent {
    pub target: NodeId,
    pub observed_term: u64,
}

/// The fields mutated exclusively by whichever task currently owns a replication
/// round: the Control Loop's Catch-Up Sender / Snapshot Shipper in STANDARD mode, or
/// the Pipeline Decoder in PIPELINE mode (§5 "Shared resources"). The Pipeline Sender
/// never reaches in here; it tracks its own local `cursor_next` (§4.4).
pub(crate) struct ReplicatorCore {
    pub(crate) next_index: u64,
    pub(crate) match_index: LogId,
    pub(crate) failures: u64,
    pub(crate) allow_pipeline: bool,
    pub(crate) inflight: InflightLedger,
}

impl ReplicatorCore {
    fn new(next_index: u64, match_index: LogId, inflight_capacity: usize) -> Self {
        Self {
            next_index,
            match_index,
            failures: 0,
            allow_pipeline: false,
            inflight: InflightLedger::new(inflight_capacity),
        }
    }
}

/// The cheaply-cloneable handle shared by the Control Loop, Heartbeater, and Pipeline
/// Decoder tasks of a single replicator. Cloning is intentional and cheap (all fields
/// are `Arc`-backed), the way the teacher's types are meant to be cloned liberally.
#[derive(Clone)]
pub(crate) struct Replicator<T, L, S, N>
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    pub(crate) peer: NodeId,
    pub(crate) term: u64,
    pub(crate) config: Arc<Config>,
    pub(crate) transport: Arc<T>,
    pub(crate) log_store: Arc<L>,
    pub(crate) snapshot_store: Arc<S>,
    pub(crate) node: Arc<N>,
    pub(crate) state: Arc<Mutex<ReplicatorCore>>,
    pub(crate) last_contact: Arc<RwLock<Option<Instant>>>,
    pub(crate) verify_queue: Arc<Mutex<Vec<oneshot::Sender<bool>>>>,
    pub(crate) heartbeat_notify: Arc<Notify>,
    pub(crate) trigger: Arc<Notify>,
    pub(crate) shutdown: Arc<Notify>,
    pub(crate) step_down_tx: mpsc::UnboundedSender<StepDownEvent>,
    pub(crate) step_down_sent: Arc<AtomicBool>,
    pub(crate) metrics_tx: Arc<tokio::sync::watch::Sender<ReplicationMetrics>>,
}

impl<T, L, S, N> Replicator<T, L, S, N>
where
    T: Transport,
    L: LogStore,
    S: SnapshotStore<Reader = T::SnapshotReader>,
    N: NodeHandle,
{
    /// Atomically swap out the whole verify queue and invoke every continuation
    /// outside the lock (§4.7 "Drain" — "holders of the queue mutex must not call
    /// continuations under the lock").
    pub(crate) async fn drain_verify(&self, outcome: bool) {
        let waiters = {
            let mut q = self.verify_queue.lock().await;
            std::mem::take(&mut *q)
        };
        for tx in waiters {
            let _ = tx.send(outcome);
        }
    }

    /// Record a successful RPC response's timestamp (§3 `lastContact`).
    pub(crate) async fn touch_last_contact(&self) {
        *self.last_contact.write().await = Some(Instant::now());
    }

    /// Signal step-down to the host node exactly once, regardless of how many
    /// concurrent call sites observe the newer term (§5 `stepDownSignal`, §8 "exactly
    /// one step-down signal delivered").
    pub(crate) fn step_down(&self, observed_term: u64) {
        if !self.step_down_sent.swap(true, Ordering::SeqCst) {
            let _ = self.step_down_tx.send(StepDownEvent {
                target: self.peer,
                observed_term,
            });
        }
    }

    pub(crate) async fn publish_metrics(&self, state: ReplicationState) {
        let matched = self.state.lock().await.match_index;
        let last_contact = *self.last_contact.read().await;
        let now = Instant::now();
        let _ = self.metrics_tx.send(ReplicationMetrics {
            target: self.peer,
            matched,
            state,
            last_contact_millis: last_contact.map(|t| crate::metrics::millis_since(t, now)),
        });
    }
}

/// Draw a randomized delay uniformly in `[base/2, base]`, the way §9 "Randomized
/// timers" specifies for the commit-timeout tick, reused here for the heartbeater's
/// sub-interval too so that neither tick synchronizes probing across peers.
pub(crate) fn jittered(base: std::time::Duration) -> std::time::Duration {
    use rand::Rng;
    let half = base / 2;
    let extra_millis = half.as_millis().max(1) as u64;
    let extra = rand::thread_rng().gen_range(0..=extra_millis);
    half + std::time::Duration::from_millis(extra)
}

/// The public handle to a spawned replicator, returned by [`FollowerReplicator::spawn`].
/// Analogous to the teacher's `ReplicationStream`.
pub struct FollowerReplicator {
    trigger: Arc<Notify>,
    shutdown: Arc<Notify>,
    stop_tx: Mutex<Option<oneshot::Sender<u64>>>,
    verify_queue: Arc<Mutex<Vec<oneshot::Sender<bool>>>>,
    heartbeat_notify: Arc<Notify>,
    metrics_rx: tokio::sync::watch::Receiver<ReplicationMetrics>,
}

impl FollowerReplicator {
    /// Spawn a new replicator for `peer`, starting in STANDARD mode (§4.1).
    ///
    /// `last_log` is the leader's current last log id, used to initialize
    /// `nextIndex = leader.lastLogIndex + 1` and `matchIndex` (§3).
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<T, L, S, N>(
        peer: NodeId,
        term: u64,
        config: Arc<Config>,
        last_log: LogId,
        transport: Arc<T>,
        log_store: Arc<L>,
        snapshot_store: Arc<S>,
        node: Arc<N>,
        step_down_tx: mpsc::UnboundedSender<StepDownEvent>,
    ) -> Self
    where
        T: Transport,
        L: LogStore,
        S: SnapshotStore<Reader = T::SnapshotReader>,
        N: NodeHandle,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (metrics_tx, metrics_rx) = tokio::sync::watch::channel(ReplicationMetrics::new(peer));

        let inflight_capacity = (config.max_append_entries as usize).max(1) * 4;
        let replicator = Replicator {
            peer,
            term,
            config,
            transport,
            log_store,
            snapshot_store,
            node,
            state: Arc::new(Mutex::new(ReplicatorCore::new(
                last_log.index + 1,
                last_log,
                inflight_capacity,
            ))),
            last_contact: Arc::new(RwLock::new(None)),
            verify_queue: Arc::new(Mutex::new(Vec::new())),
            heartbeat_notify: Arc::new(Notify::new()),
            trigger: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
            step_down_tx,
            step_down_sent: Arc::new(AtomicBool::new(false)),
            metrics_tx: Arc::new(metrics_tx),
        };

        let trigger = replicator.trigger.clone();
        let shutdown = replicator.shutdown.clone();
        let verify_queue = replicator.verify_queue.clone();
        let heartbeat_notify = replicator.heartbeat_notify.clone();

        let heartbeat_replicator = replicator.clone();
        tokio::spawn(
            async move { heartbeat::run_heartbeater(heartbeat_replicator).await }
                .instrument(tracing::debug_span!("heartbeater", target = peer)),
        );

        tokio::spawn(
            async move { control::run_control_loop(replicator, stop_rx).await }
                .instrument(tracing::debug_span!("replicate", target = peer)),
        );

        Self {
            trigger,
            shutdown,
            stop_tx: Mutex::new(Some(stop_tx)),
            verify_queue,
            heartbeat_notify,
            metrics_rx,
        }
    }

    /// Notify the replicator that new entries may be available to send (§3
    /// `trigger`).
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Tear down the replicator. `drain_to` of 0 means "no drain"; otherwise the
    /// replicator makes a best-effort attempt to replicate up to that index before
    /// exiting (§4.1, §8 scenario 6).
    pub async fn stop(&self, drain_to: u64) {
        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(drain_to);
        }
        self.shutdown.notify_waiters();
    }

    /// Enqueue a leadership-verify continuation, answered by the outcome of the next
    /// heartbeat or replication round-trip (§4.7, GLOSSARY "Verify"). Nudges the
    /// heartbeater to probe immediately rather than waiting out its full interval
    /// (§4.7 "Enqueue").
    pub async fn verify(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.verify_queue.lock().await.push(tx);
        self.heartbeat_notify.notify_one();
        rx
    }

    /// A live view of this replicator's progress, suitable for aggregation by the
    /// host node.
    pub fn metrics(&self) -> ReplicationMetrics {
        self.metrics_rx.borrow().clone()
    }

    /// Subscribe to metrics updates.
    pub fn subscribe_metrics(&self) -> tokio::sync::watch::Receiver<ReplicationMetrics> {
        self.metrics_rx.clone()
    }
}
