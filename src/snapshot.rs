//! Snapshot metadata and the `SnapshotStore` collaborator trait.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::error::SnapshotStoreError;
use crate::NodeId;

/// Metadata describing a snapshot covering all log entries with index `<= index`
/// (§3).
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct SnapshotMeta {
    /// Opaque identifier used to open the snapshot's reader.
    pub id: String,
    pub index: u64,
    pub term: u64,
    /// The cluster membership covered by this snapshot.
    pub peers: Vec<NodeId>,
    /// The exact byte length of the snapshot payload.
    pub size: u64,
}

/// The durable snapshot store collaborator (§6.1). `list()` is ordered newest-first;
/// `open(id)` streams the full payload exactly once.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// List known snapshots, newest first. An empty list is not an error by itself;
    /// the caller (Snapshot Shipper) turns that into `NoSnapshotsAvailable` (§4.3 step
    /// 1).
    async fn list(&self) -> Result<Vec<SnapshotMeta>, SnapshotStoreError>;

    /// Open the snapshot identified by `id` for streaming.
    async fn open(&self, id: &str) -> Result<(SnapshotMeta, Self::Reader), SnapshotStoreError>;
}
