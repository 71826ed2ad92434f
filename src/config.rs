//! Configuration for xlog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, XlogError};

/// Default segment rotation threshold (100 MB)
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 100 * 1024 * 1024;

/// Default interval between background compaction passes
pub const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Main configuration for a commit log instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding every segment of the log
    /// Internal structure:
    ///   {log_dir}/
    ///     ├── 00000000000000000000.log
    ///     ├── 00000000000000028340.log
    ///     └── 00000000000000028340.cleaned   (only during compaction)
    pub log_dir: PathBuf,

    /// Size in bytes at which the active segment is rotated
    pub max_segment_bytes: u64,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// How often the background scheduler compacts rotated segments
    pub compaction_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("xlog"),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(XlogError::EmptyPath);
        }
        if self.compaction_interval.is_zero() {
            return Err(XlogError::Config(
                "compaction interval must be greater than zero".to_string(),
            ));
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
    /// Set the log directory
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_dir = path.into();
        self
    }

    /// Set the segment rotation threshold (in bytes); zero keeps the default
    pub fn max_segment_bytes(mut self, bytes: u64) -> Self {
        if bytes > 0 {
            self.config.max_segment_bytes = bytes;
        }
        self
    }

    /// Set the background compaction interval
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.config.compaction_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
