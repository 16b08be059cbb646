//! Configuration for wald
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WalError};
use crate::wal::HEADER_SIZE;

/// Default maximum size of one segment file (1 GiB)
pub const DEFAULT_SEGMENT_BYTES: u64 = 1 << 30;

/// Default write buffer capacity (4 KiB)
pub const DEFAULT_BUFFER_BYTES: usize = 4 * 1024;

/// Default background flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Main configuration for a WAL instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files
    /// Internal structure:
    ///   {dir}/
    ///     ├── 00000000000000000001.wal
    ///     ├── 00000000000000000002.wal
    ///     └── ...
    pub dir: PathBuf,

    /// Rotate to a new segment before a write would grow the active one past this
    pub max_segment_bytes: u64,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Flush and fsync after every write
    pub sync: bool,

    /// Capacity of the in-memory write buffer (in bytes)
    pub buffer_bytes: usize,

    /// Interval of the background flusher
    pub flush_interval: Duration,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// What recovery does when it meets a corrupt or torn record
    pub recovery_policy: RecoveryPolicy,
}

/// Recovery behavior for damaged records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Refuse to open a log containing a corrupt or truncated record
    #[default]
    Strict,

    /// Keep everything before the first bad record, cut the log there
    TruncateTail,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/wal"),
            max_segment_bytes: DEFAULT_SEGMENT_BYTES,
            sync: true,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            recovery_policy: RecoveryPolicy::Strict,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config rooted at `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings the writer cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(WalError::Config("WAL directory must not be empty".to_string()));
        }
        if self.max_segment_bytes < HEADER_SIZE as u64 {
            return Err(WalError::Config(format!(
                "max_segment_bytes must be at least {} (got {})",
                HEADER_SIZE, self.max_segment_bytes
            )));
        }
        if self.flush_interval.is_zero() {
            return Err(WalError::Config("flush_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the segment directory
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir = path.into();
        self
    }

    /// Set the maximum segment size (in bytes)
    pub fn max_segment_bytes(mut self, size: u64) -> Self {
        self.config.max_segment_bytes = size;
        self
    }

    /// Enable or disable fsync after every write
    pub fn sync(mut self, sync: bool) -> Self {
        self.config.sync = sync;
        self
    }

    /// Set the write buffer capacity (in bytes)
    pub fn buffer_bytes(mut self, size: usize) -> Self {
        self.config.buffer_bytes = size;
        self
    }

    /// Set the background flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the recovery policy
    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery_policy = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
