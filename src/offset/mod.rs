//! Consumer Offset Module
//!
//! Tracks, per sink and per namespace, the newest commit log offset that has
//! been fully delivered.
//!
//! ## Storage
//! Each sink gets its own commit log under `{dir}/__consumer_offsets-{name}`.
//! Every commit is one entry: key = namespace, value = 8-byte big-endian
//! offset. The latest entry for a namespace wins when the map is rebuilt.

mod manager;

pub use manager::{LogOffsetManager, OffsetManager, OFFSET_DIR_PREFIX};

use crate::commitlog::{LogEntry, Mode, Operation};
use crate::error::{Result, XlogError};

/// Width of the encoded offset value
pub(crate) const OFFSET_VALUE_LEN: usize = 8;

/// Offset a sink has finished with for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub namespace: String,
    pub log_offset: u64,
    pub timestamp: u64,
}

impl Offset {
    pub fn new(namespace: impl Into<String>, log_offset: u64, timestamp: u64) -> Self {
        Self {
            namespace: namespace.into(),
            log_offset,
            timestamp,
        }
    }

    /// The commit log entry persisted for this offset
    pub fn to_entry(&self) -> LogEntry {
        LogEntry::new(
            self.namespace.as_bytes(),
            self.log_offset.to_be_bytes(),
            self.timestamp,
            Mode::Copy,
            Operation::Insert,
        )
    }

    /// Rebuild an offset from a persisted entry
    pub fn from_entry(entry: &LogEntry) -> Result<Self> {
        let value: [u8; OFFSET_VALUE_LEN] = entry.value.as_slice().try_into().map_err(|_| {
            XlogError::MalformedEntry(format!(
                "offset value must be {} bytes, got {}",
                OFFSET_VALUE_LEN,
                entry.value.len()
            ))
        })?;
        let namespace = String::from_utf8(entry.key.clone())
            .map_err(|e| XlogError::MalformedEntry(format!("namespace is not UTF-8: {}", e)))?;
        Ok(Self {
            namespace,
            log_offset: u64::from_be_bytes(value),
            timestamp: entry.timestamp,
        })
    }
}
