//! Fixtures for testing the replication core: an in-memory log/snapshot store, a node
//! accessor over plain fields, and a transport backed by a small scripted follower
//! model that applies the same consistency-check rules a real follower would.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::io::Read as _;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::ReadBuf;
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

use raft_replicate::error::LogStoreError;
use raft_replicate::error::SnapshotStoreError;
use raft_replicate::error::TransportError;
use raft_replicate::log::LogEntry;
use raft_replicate::log::LogId;
use raft_replicate::log::LogStore;
use raft_replicate::node::NodeHandle;
use raft_replicate::snapshot::SnapshotMeta;
use raft_replicate::snapshot::SnapshotStore;
use raft_replicate::transport::AppendEntriesRequest;
use raft_replicate::transport::AppendEntriesResponse;
use raft_replicate::transport::InstallSnapshotRequest;
use raft_replicate::transport::InstallSnapshotResponse;
use raft_replicate::transport::Pipeline;
use raft_replicate::transport::PipelineAck;
use raft_replicate::transport::PipelineConsumer;
use raft_replicate::transport::Transport;
use raft_replicate::NodeId;

/// Initialize the tracing system for a test run. Safe to call from every test in this
/// binary: only the first call installs the global subscriber, later calls are no-ops,
/// since multiple `#[tokio::test]` functions in this file may initialize concurrently.
pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::Layer::default()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_ansi(false);
    let subscriber = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(fmt_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Fixed leader-side log: entries below `floor` are treated as compacted away.
pub struct LeaderLog {
    pub entries: Vec<LogEntry>,
    pub floor: u64,
}

#[async_trait]
impl LogStore for LeaderLog {
    async fn get_log(&self, index: u64) -> Result<LogEntry, LogStoreError> {
        if index <= self.floor {
            return Err(LogStoreError::NotFound);
        }
        self.entries
            .iter()
            .find(|e| e.log_id.index == index)
            .cloned()
            .ok_or(LogStoreError::NotFound)
    }

    async fn get_log_range(&self, start: u64, stop: u64) -> Result<Vec<LogEntry>, LogStoreError> {
        let mut out = Vec::new();
        let mut idx = start;
        while idx <= stop {
            out.push(self.get_log(idx).await?);
            idx += 1;
        }
        Ok(out)
    }
}

/// A leader node's fixed view of itself for the duration of one test.
pub struct StaticNode {
    pub last_log_index: AtomicU64,
    pub commit_index: u64,
    pub snapshot_index: u64,
    pub snapshot_term: u64,
    pub addr: NodeId,
}

impl NodeHandle for StaticNode {
    fn last_log_index(&self) -> u64 {
        self.last_log_index.load(Ordering::SeqCst)
    }

    fn commit_index(&self) -> u64 {
        self.commit_index
    }

    fn last_snapshot_index(&self) -> u64 {
        self.snapshot_index
    }

    fn last_snapshot_term(&self) -> u64 {
        self.snapshot_term
    }

    fn local_addr(&self) -> NodeId {
        self.addr
    }
}

/// A single leader-produced snapshot, servable exactly once per `open` call.
pub struct OneSnapshot {
    pub meta: SnapshotMeta,
    pub bytes: Vec<u8>,
}

pub struct LeaderSnapshots {
    pub snapshot: Mutex<Option<OneSnapshot>>,
}

pub struct MemReader(Cursor<Vec<u8>>);

impl AsyncRead for MemReader {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let n = this.0.read(buf.initialize_unfilled())?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl SnapshotStore for LeaderSnapshots {
    type Reader = MemReader;

    async fn list(&self) -> Result<Vec<SnapshotMeta>, SnapshotStoreError> {
        Ok(self.snapshot.lock().unwrap().as_ref().map(|s| vec![s.meta.clone()]).unwrap_or_default())
    }

    async fn open(&self, id: &str) -> Result<(SnapshotMeta, Self::Reader), SnapshotStoreError> {
        let guard = self.snapshot.lock().unwrap();
        let snap = guard.as_ref().ok_or(SnapshotStoreError::NoSnapshotsAvailable)?;
        if snap.meta.id != id {
            return Err(SnapshotStoreError::NoSnapshotsAvailable);
        }
        Ok((snap.meta.clone(), MemReader(Cursor::new(snap.bytes.clone()))))
    }
}

/// A minimal stand-in for a real follower: applies the same `(prevLogIndex,
/// prevLogTerm)` consistency check and snapshot-install semantics a production
/// follower would, so the leader-side code under test is exercised against realistic
/// accept/reject behavior instead of canned responses.
#[derive(Default)]
pub struct FollowerModel {
    pub term: u64,
    pub entries: BTreeMap<u64, LogId>,
    pub snapshot: Option<LogId>,
    pub force_higher_term: Option<u64>,
    /// When set, the next `append` call is rejected once (consumed on use) regardless
    /// of whether the consistency check would otherwise pass. Stands in for any
    /// generic application-level rejection a real follower might return.
    pub reject_next: AtomicBool,
}

impl FollowerModel {
    fn last_log_index(&self) -> u64 {
        self.entries
            .keys()
            .next_back()
            .copied()
            .unwrap_or_else(|| self.snapshot.map(|s| s.index).unwrap_or(0))
    }

    fn id_at(&self, index: u64) -> Option<LogId> {
        if index == 0 {
            return Some(LogId::sentinel());
        }
        if let Some(s) = self.snapshot {
            if s.index == index {
                return Some(s);
            }
        }
        self.entries.get(&index).copied()
    }

    fn bumped_term(&mut self, request_term: u64) -> Option<u64> {
        if let Some(forced) = self.force_higher_term.take() {
            self.term = forced;
            return Some(forced);
        }
        if request_term > self.term {
            self.term = request_term;
        }
        None
    }

    pub fn append(&mut self, req: &AppendEntriesRequest) -> AppendEntriesResponse {
        if let Some(forced) = self.bumped_term(req.term) {
            return AppendEntriesResponse {
                term: forced,
                last_log: self.last_log_index(),
                success: false,
            };
        }
        if req.term < self.term {
            return AppendEntriesResponse {
                term: self.term,
                last_log: self.last_log_index(),
                success: false,
            };
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return AppendEntriesResponse {
                term: self.term,
                last_log: self.last_log_index(),
                success: false,
            };
        }
        if self.id_at(req.prev_log_id.index) != Some(req.prev_log_id) {
            return AppendEntriesResponse {
                term: self.term,
                last_log: self.last_log_index(),
                success: false,
            };
        }
        for e in &req.entries {
            if self.entries.get(&e.log_id.index) != Some(&e.log_id) {
                self.entries.retain(|&idx, _| idx < e.log_id.index);
            }
            self.entries.insert(e.log_id.index, e.log_id);
        }
        AppendEntriesResponse {
            term: self.term,
            last_log: self.last_log_index(),
            success: true,
        }
    }

    pub fn install_snapshot(&mut self, req: &InstallSnapshotRequest) -> InstallSnapshotResponse {
        if let Some(forced) = self.bumped_term(req.term) {
            return InstallSnapshotResponse { term: forced, success: false };
        }
        if req.term < self.term {
            return InstallSnapshotResponse { term: self.term, success: false };
        }
        self.snapshot = Some(req.last_log_id);
        self.entries.retain(|&idx, _| idx > req.last_log_id.index);
        InstallSnapshotResponse { term: self.term, success: true }
    }
}

/// The transport under test: every RPC and pipeline send is applied synchronously to a
/// shared [`FollowerModel`].
pub struct ScriptedTransport {
    pub follower: std::sync::Arc<Mutex<FollowerModel>>,
}

pub struct ScriptedPipeline {
    follower: std::sync::Arc<Mutex<FollowerModel>>,
    ack_tx: mpsc::UnboundedSender<PipelineAck>,
    ack_rx: Option<mpsc::UnboundedReceiver<PipelineAck>>,
}

pub struct ScriptedConsumer {
    ack_rx: mpsc::UnboundedReceiver<PipelineAck>,
}

#[async_trait]
impl PipelineConsumer for ScriptedConsumer {
    async fn recv(&mut self) -> Option<PipelineAck> {
        self.ack_rx.recv().await
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    type Consumer = ScriptedConsumer;

    async fn send(&mut self, req: AppendEntriesRequest) -> Result<(), TransportError> {
        let response = self.follower.lock().unwrap().append(&req);
        let ack = PipelineAck {
            request: req,
            response,
            submitted_at: tokio::time::Instant::now(),
        };
        let _ = self.ack_tx.send(ack);
        Ok(())
    }

    fn take_consumer(&mut self) -> Self::Consumer {
        ScriptedConsumer {
            ack_rx: self.ack_rx.take().expect("take_consumer called twice"),
        }
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Transport for ScriptedTransport {
    type SnapshotReader = MemReader;
    type Pipeline = ScriptedPipeline;

    fn encode_peer(&self, peer: NodeId) -> Vec<u8> {
        peer.to_be_bytes().to_vec()
    }

    async fn append_entries(&self, _peer: NodeId, req: AppendEntriesRequest) -> Result<AppendEntriesResponse, TransportError> {
        Ok(self.follower.lock().unwrap().append(&req))
    }

    async fn install_snapshot(
        &self,
        _peer: NodeId,
        req: InstallSnapshotRequest,
        mut reader: Self::SnapshotReader,
    ) -> Result<InstallSnapshotResponse, TransportError> {
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf)
            .await
            .map_err(|e| TransportError::Other(e.into()))?;
        Ok(self.follower.lock().unwrap().install_snapshot(&req))
    }

    async fn append_entries_pipeline(&self, _peer: NodeId) -> Result<Self::Pipeline, TransportError> {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        Ok(ScriptedPipeline {
            follower: self.follower.clone(),
            ack_tx,
            ack_rx: Some(ack_rx),
        })
    }
}
