//! Runtime configuration for the replication core.

use std::time::Duration;

use crate::error::ConfigError;

/// Runtime config for a [`crate::replication::FollowerReplicator`].
///
/// An instance is built once per leadership term via [`ConfigBuilder`] and shared
/// (`Arc`) across every per-peer replicator, the way the teacher's `Config` is built
/// once per `Raft` instance and handed to every `ReplicationCore`.
#[derive(Clone, Debug)]
pub struct Config {
    /// The sub-interval at which the heartbeater pings a peer, independent of
    /// replication traffic. §4.6.
    pub heartbeat_interval: Duration,
    /// The base interval for the randomized STANDARD/PIPELINE commit-timeout tick.
    /// §4.1, §4.4.
    pub commit_timeout: Duration,
    /// The maximum number of log entries sent in a single `AppendEntries` batch.
    /// §4.2 step 3.
    pub max_append_entries: u64,
    /// The base duration for exponential backoff after a failed exchange. §5.
    pub failure_wait: Duration,
    /// Sizing hint for the snapshot shipper's streaming reads.
    pub snapshot_max_chunk_size: u64,
}

impl Config {
    /// Start building a new `Config` using the crate's recommended defaults.
    pub fn build() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Compute the exponential backoff delay for the given number of consecutive
    /// failures. `backoff(base, failures, cap) = base * 2^min(failures, cap)`, with
    /// `cap = 14` so the factor saturates at 16384. §5.
    pub fn backoff(&self, failures: u64) -> Duration {
        backoff(self.failure_wait, failures, BACKOFF_CAP)
    }
}

/// The exponent cap on failure-driven retry delay (§5, §8 "Backoff cap (14)").
pub const BACKOFF_CAP: u32 = 14;

/// `base * 2^min(failures, cap)`, saturating rather than overflowing for absurdly large
/// failure counts.
pub fn backoff(base: Duration, failures: u64, cap: u32) -> Duration {
    let exp = failures.min(cap as u64) as u32;
    let factor = 1u64 << exp;
    base.saturating_mul(factor as u32)
}

/// Builder for [`Config`], validated once at `build()` time rather than on every field
/// access, the way the teacher validates its own `Config` before handing it to
/// `Raft::new`.
pub struct ConfigBuilder {
    heartbeat_interval: Duration,
    commit_timeout: Duration,
    max_append_entries: u64,
    failure_wait: Duration,
    snapshot_max_chunk_size: u64,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(50),
            commit_timeout: Duration::from_millis(500),
            max_append_entries: 300,
            failure_wait: Duration::from_millis(10),
            snapshot_max_chunk_size: 64 * 1024,
        }
    }
}

impl ConfigBuilder {
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    pub fn commit_timeout(mut self, d: Duration) -> Self {
        self.commit_timeout = d;
        self
    }

    pub fn max_append_entries(mut self, n: u64) -> Self {
        self.max_append_entries = n;
        self
    }

    pub fn failure_wait(mut self, d: Duration) -> Self {
        self.failure_wait = d;
        self
    }

    pub fn snapshot_max_chunk_size(mut self, n: u64) -> Self {
        self.snapshot_max_chunk_size = n;
        self
    }

    /// Validate and finalize the config.
    pub fn validate(self) -> Result<Config, ConfigError> {
        if self.max_append_entries < 1 {
            return Err(ConfigError::InvalidMaxAppendEntries);
        }
        if self.heartbeat_interval >= self.commit_timeout {
            return Err(ConfigError::HeartbeatNotFasterThanCommitTimeout);
        }
        Ok(Config {
            heartbeat_interval: self.heartbeat_interval,
            commit_timeout: self.commit_timeout,
            max_append_entries: self.max_append_entries,
            failure_wait: self.failure_wait,
            snapshot_max_chunk_size: self.snapshot_max_chunk_size,
        })
    }
}
