//! Log entry data model and the `LogStore` collaborator trait.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::LogStoreError;

/// The (term, index) identity of a log entry. Index 0 / term 0 is the sentinel "no
/// previous entry" (§3).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogId {
    pub term: u64,
    pub index: u64,
}

impl LogId {
    pub const fn new(term: u64, index: u64) -> Self {
        Self { term, index }
    }

    /// The sentinel identity preceding the first real entry.
    pub const fn sentinel() -> Self {
        Self { term: 0, index: 0 }
    }
}

impl std::fmt::Display for LogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.term, self.index)
    }
}

/// The payload carried by a log entry. `ConfigChange` is intentionally not modeled:
/// cluster membership change is an explicit Non-goal (§1).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryPayload {
    /// An empty entry committed by a newly elected leader, used only to anchor a term.
    Blank,
    /// An application-defined, opaque command.
    Normal(Vec<u8>),
}

/// A single entry in the replicated log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub log_id: LogId,
    pub payload: EntryPayload,
}

impl LogEntry {
    pub fn index(&self) -> u64 {
        self.log_id.index
    }

    pub fn term(&self) -> u64 {
        self.log_id.term
    }
}

/// The durable log store collaborator (§6.1). Entries below the latest snapshot's
/// index MAY be absent; that is signaled by [`LogStoreError::NotFound`], not by an
/// empty `Ok` result.
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Fetch the entry at `index`, or `Err(LogStoreError::NotFound)` if it has been
    /// compacted away or never existed.
    async fn get_log(&self, index: u64) -> Result<LogEntry, LogStoreError>;

    /// Fetch entries `[start, stop]` inclusive. Must return `NotFound` as soon as any
    /// requested index is unavailable (§4.2 step 3). `start > stop` is a valid empty
    /// range (a consistency probe with no new entries to send), not an error.
    async fn get_log_range(&self, start: u64, stop: u64) -> Result<Vec<LogEntry>, LogStoreError>;
}
