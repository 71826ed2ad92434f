//! Commit Log
//!
//! Owns the ordered list of segments, assigns offsets, rotates segments by
//! size and provides offset-indexed readers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, XlogError};

use super::entry::{LogEntry, Mode, Operation};
use super::reader::Reader;
use super::recovery;
use super::segment::{Segment, SegmentFileKind};

/// How the rest of the system persists and reads records
///
/// ## Concurrency:
/// - `segments`: RwLock, ordered by base offset; the last one is active
/// - `append_lock`: serializes appends so rotation and a write never interleave
/// - Readers and compaction only take `segments` briefly
pub struct CommitLog {
    path: PathBuf,
    max_segment_bytes: u64,
    segments: RwLock<Vec<Arc<Segment>>>,
    append_lock: Mutex<()>,
}

impl CommitLog {
    /// Open or create a log in `path`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Finish any compaction interrupted mid-swap
    /// 3. Open every `.log` segment in base offset order
    /// 4. Create segment 0 if there were none
    pub fn open(path: impl AsRef<Path>, max_segment_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(XlogError::EmptyPath);
        }
        fs::create_dir_all(path)?;

        let base_offsets = recovery::recover(path)?;

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            let segment = Segment::open(path, base_offset, max_segment_bytes)?;
            segments.push(Arc::new(segment));
        }
        if segments.is_empty() {
            segments.push(Arc::new(Segment::open(path, 0, max_segment_bytes)?));
        }

        tracing::info!(
            path = %path.display(),
            num_segments = segments.len(),
            "commit log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            max_segment_bytes,
            segments: RwLock::new(segments),
            append_lock: Mutex::new(()),
        })
    }

    /// Open the log described by `config`
    pub fn with_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::open(&config.log_dir, config.max_segment_bytes)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record, returning the offset assigned to it
    pub fn append(
        &self,
        key: &[u8],
        value: &[u8],
        timestamp: u64,
        mode: Mode,
        op: Operation,
    ) -> Result<u64> {
        let entry = LogEntry::new(key, value, timestamp, mode, op);
        self.append_entry(&entry)
    }

    /// Append a prepared entry, returning the offset assigned to it
    pub fn append_entry(&self, entry: &LogEntry) -> Result<u64> {
        entry.validate()?;
        let _guard = self.append_lock.lock();

        let mut active = self.active_segment();
        if active.is_full() {
            active = self.split(&active)?;
        }

        let offset = active.next_offset();
        active.write(&entry.encode(offset))?;
        Ok(offset)
    }

    /// Start a new active segment at the current newest offset
    fn split(&self, active: &Segment) -> Result<Arc<Segment>> {
        let segment = Arc::new(Segment::open(
            &self.path,
            active.next_offset(),
            self.max_segment_bytes,
        )?);
        tracing::info!(
            segment = %segment.path().display(),
            base_offset = segment.base_offset(),
            "new segment created"
        );
        self.segments.write().push(Arc::clone(&segment));
        Ok(segment)
    }

    // =========================================================================
    // Offsets
    // =========================================================================

    /// Offset the next append will receive
    pub fn newest_offset(&self) -> u64 {
        self.active_segment().next_offset()
    }

    /// Base offset of the oldest segment on disk
    pub fn oldest_offset(&self) -> u64 {
        self.segments.read()[0].base_offset()
    }

    /// Snapshot of the segments, ordered by base offset
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    pub(crate) fn active_segment(&self) -> Arc<Segment> {
        let segments = self.segments.read();
        Arc::clone(&segments[segments.len() - 1])
    }

    pub(crate) fn is_active(&self, segment: &Arc<Segment>) -> bool {
        Arc::ptr_eq(&self.active_segment(), segment)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_segment_bytes(&self) -> u64 {
        self.max_segment_bytes
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Create a reader positioned at `offset`
    ///
    /// A negative offset means no resume point is known: the reader starts at
    /// the first byte of the oldest segment.
    pub fn new_reader(&self, offset: i64) -> Result<Reader<'_>> {
        let segments = self.segments();
        tracing::debug!(num_segments = segments.len(), offset, "searching segments");

        let Ok(offset) = u64::try_from(offset) else {
            return Ok(Reader::new(self, 0, Arc::clone(&segments[0]), 0));
        };

        // The last segment extends to infinity
        let idx = segments
            .windows(2)
            .position(|pair| offset >= pair[0].base_offset() && offset < pair[1].base_offset())
            .unwrap_or(segments.len() - 1);

        tracing::debug!(offset, segment_index = idx, "finding offset in segment");
        let segment = Arc::clone(&segments[idx]);
        let position = segment.find_offset_position(offset)?;
        Ok(Reader::new(self, idx, segment, position))
    }

    // =========================================================================
    // Compaction Support
    // =========================================================================

    /// Swap a compacted `.cleaned` segment in for `old`
    ///
    /// Rename order is what recovery relies on:
    /// `.cleaned -> .swap`, `.log -> .deleted`, `.swap -> .log`, remove `.deleted`.
    pub(crate) fn replace_segment(&self, new: Arc<Segment>, old: &Arc<Segment>) -> Result<()> {
        let mut segments = self.segments.write();
        let idx = segments
            .iter()
            .position(|s| Arc::ptr_eq(s, old))
            .ok_or(XlogError::SegmentNotFound(old.base_offset()))?;

        tracing::info!(
            new_segment = %new.path().display(),
            old_segment = %old.path().display(),
            "replacing segment"
        );
        new.rename(SegmentFileKind::Swap)?;
        old.rename(SegmentFileKind::Deleted)?;
        new.rename(SegmentFileKind::Log)?;
        old.remove_file()?;
        segments[idx] = new;

        tracing::info!(base_offset = old.base_offset(), "segment replacement complete");
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close every segment
    pub fn close(&self) -> Result<()> {
        let _guard = self.append_lock.lock();
        for segment in self.segments.read().iter() {
            segment.close()?;
        }
        Ok(())
    }

    /// Close the log and remove its whole directory
    pub fn delete_all(&self) -> Result<()> {
        self.close()?;
        fs::remove_dir_all(&self.path)?;
        Ok(())
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("path", &self.path)
            .field("max_segment_bytes", &self.max_segment_bytes)
            .field("num_segments", &self.segments.read().len())
            .finish()
    }
}
