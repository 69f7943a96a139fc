//! Error types for the replication core.
//!
//! Following the teacher's split: `thiserror` for typed errors crossing a trait
//! boundary (storage, transport, config), `anyhow` for the internal glue that just
//! needs to be logged and does not need to be pattern-matched on downstream.

use thiserror::Error;

/// Errors returned while validating a [`crate::config::ConfigBuilder`].
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfigError {
    #[error("max_append_entries must be at least 1")]
    InvalidMaxAppendEntries,
    #[error("heartbeat_interval must be shorter than commit_timeout")]
    HeartbeatNotFasterThanCommitTimeout,
}

/// Errors returned by a [`crate::log::LogStore`].
#[derive(Error, Debug)]
pub enum LogStoreError {
    /// The requested index is not present. Below the latest snapshot's index this is
    /// an expected condition that diverts the caller to snapshot shipping (§4.2, §4.4).
    #[error("log entry not found")]
    NotFound,
    /// Any other storage-layer failure. Aborts the current round without stopping the
    /// replicator (§7).
    #[error("log store error: {0}")]
    Other(#[source] anyhow::Error),
}

/// Errors returned by a [`crate::snapshot::SnapshotStore`].
#[derive(Error, Debug)]
pub enum SnapshotStoreError {
    #[error("no snapshots available")]
    NoSnapshotsAvailable,
    #[error("snapshot store error: {0}")]
    Other(#[source] anyhow::Error),
}

/// Errors returned by a [`crate::transport::Transport`] RPC.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport error: {0}")]
    Other(#[source] anyhow::Error),
}