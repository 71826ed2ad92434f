//! Offset Manager
//!
//! Persists consumer offsets in a dedicated commit log.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::commitlog::CommitLog;
use crate::error::Result;

use super::Offset;

/// Directory name prefix of every sink's offset log
pub const OFFSET_DIR_PREFIX: &str = "__consumer_offsets-";

/// Offset logs only hold tiny entries, so they rarely need to rotate
const OFFSET_SEGMENT_BYTES: u64 = 1024 * 1024 * 1024;

/// Tracks delivered offsets per namespace for one consumer
pub trait OffsetManager: Send + Sync {
    /// Record `offset` for its namespace
    ///
    /// An offset that does not move the namespace forward is ignored unless
    /// `force` is set.
    fn commit_offset(&self, offset: Offset, force: bool) -> Result<()>;

    /// Newest committed offset for every namespace
    fn offset_map(&self) -> HashMap<String, u64>;

    /// Highest offset committed across all namespaces, if any
    fn newest_offset(&self) -> Option<u64>;
}

/// Offset manager backed by a commit log
pub struct LogOffsetManager {
    name: String,
    log: CommitLog,
    /// Namespace -> newest committed offset
    offsets: Mutex<HashMap<String, u64>>,
}

impl LogOffsetManager {
    /// Open (or create) the offset log for consumer `name` under `dir`
    ///
    /// Replays every persisted commit to rebuild the namespace map.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let log = CommitLog::open(Self::log_path(dir.as_ref(), name), OFFSET_SEGMENT_BYTES)?;

        let mut offsets = HashMap::new();
        for item in log.new_reader(-1)?.entries() {
            let (_, entry) = item?;
            let offset = Offset::from_entry(&entry)?;
            offsets.insert(offset.namespace, offset.log_offset);
        }
        tracing::debug!(consumer = name, namespaces = offsets.len(), "offset map rebuilt");

        Ok(Self {
            name: name.to_string(),
            log,
            offsets: Mutex::new(offsets),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The commit log holding this consumer's offsets
    pub fn log(&self) -> &CommitLog {
        &self.log
    }

    /// `{dir}/__consumer_offsets-{name}`
    pub fn log_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}{}", OFFSET_DIR_PREFIX, name))
    }

    /// Names of every consumer with an offset log under `dir`, sorted
    pub fn consumers(dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix(OFFSET_DIR_PREFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open the offset log of every consumer under `dir`
    pub fn open_all(dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        Self::consumers(dir)?
            .iter()
            .map(|name| Self::open(dir, name))
            .collect()
    }

    /// Remove the offset log of consumer `name`
    pub fn delete(dir: impl AsRef<Path>, name: &str) -> Result<()> {
        fs::remove_dir_all(Self::log_path(dir.as_ref(), name))?;
        Ok(())
    }
}

impl OffsetManager for LogOffsetManager {
    fn commit_offset(&self, offset: Offset, force: bool) -> Result<()> {
        let mut offsets = self.offsets.lock();
        if let Some(&current) = offsets.get(&offset.namespace) {
            if !force && current >= offset.log_offset {
                tracing::debug!(
                    current_offset = current,
                    provided_offset = offset.log_offset,
                    "refusing to commit offset"
                );
                return Ok(());
            }
        }

        self.log.append_entry(&offset.to_entry())?;
        offsets.insert(offset.namespace, offset.log_offset);
        Ok(())
    }

    fn offset_map(&self) -> HashMap<String, u64> {
        self.offsets.lock().clone()
    }

    fn newest_offset(&self) -> Option<u64> {
        self.offsets.lock().values().copied().max()
    }
}

impl std::fmt::Debug for LogOffsetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogOffsetManager")
            .field("name", &self.name)
            .field("log", &self.log)
            .finish()
    }
}
