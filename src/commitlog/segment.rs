//! Segment
//!
//! One append-only file holding a contiguous run of offsets starting at a
//! fixed base offset.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Buf;
use parking_lot::Mutex;

use crate::error::{Result, XlogError};

use super::entry::{read_full, EntryHeader, LogEntry, HEADER_SIZE, LENGTH_PREFIXES};

// =============================================================================
// File Naming
// =============================================================================

/// The role a file plays for its base offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentFileKind {
    /// Live segment
    Log,
    /// Compacted replacement, written but not yet verified
    Cleaned,
    /// Verified replacement waiting to take over
    Swap,
    /// Original segment pending removal
    Deleted,
}

impl SegmentFileKind {
    pub const ALL: [SegmentFileKind; 4] = [
        SegmentFileKind::Log,
        SegmentFileKind::Cleaned,
        SegmentFileKind::Swap,
        SegmentFileKind::Deleted,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            SegmentFileKind::Log => ".log",
            SegmentFileKind::Cleaned => ".cleaned",
            SegmentFileKind::Swap => ".swap",
            SegmentFileKind::Deleted => ".deleted",
        }
    }

    /// "00000000000000000100.log" for base offset 100
    pub fn file_name(self, base_offset: u64) -> String {
        format!("{:020}{}", base_offset, self.suffix())
    }

    pub fn path(self, dir: &Path, base_offset: u64) -> PathBuf {
        dir.join(self.file_name(base_offset))
    }

    /// Parse a directory entry name
    ///
    /// Returns `None` for names that are not segment files at all, and an
    /// error when the suffix matches but the stem is not a base offset.
    pub fn parse(name: &str) -> Option<Result<(u64, SegmentFileKind)>> {
        let kind = Self::ALL
            .into_iter()
            .find(|kind| name.ends_with(kind.suffix()))?;
        let stem = &name[..name.len() - kind.suffix().len()];
        Some(
            stem.parse::<u64>()
                .map(|base| (base, kind))
                .map_err(|_| XlogError::InvalidFileName(name.to_string())),
        )
    }
}

// =============================================================================
// Segment
// =============================================================================

/// Handles reading and writing one segment file on disk
///
/// ## Concurrency:
/// - All file access goes through `state` (reads seek, so they need the lock)
/// - Appends are single-entry; callers never batch entries into one write
pub struct Segment {
    base_offset: u64,
    max_bytes: u64,
    state: Mutex<SegmentState>,
}

struct SegmentState {
    /// `None` once the segment has been closed
    file: Option<File>,
    path: PathBuf,
    kind: SegmentFileKind,
    next_offset: u64,
    /// Current write position (file length)
    position: u64,
}

impl SegmentState {
    fn file(&mut self, base_offset: u64) -> Result<&mut File> {
        self.file.as_mut().ok_or(XlogError::SegmentClosed(base_offset))
    }
}

/// Outcome of scanning a segment file from byte 0
struct ScanResult {
    next_offset: u64,
    position: u64,
    torn_bytes: u64,
}

impl Segment {
    /// Open (creating if absent) the `.log` file for `base_offset`
    ///
    /// Scans every entry to recover `next_offset` and the write position.
    pub fn open(dir: &Path, base_offset: u64, max_bytes: u64) -> Result<Self> {
        Self::open_kind(dir, base_offset, max_bytes, SegmentFileKind::Log)
    }

    /// Open (creating if absent) the file of the given kind for `base_offset`
    pub fn open_kind(
        dir: &Path,
        base_offset: u64,
        max_bytes: u64,
        kind: SegmentFileKind,
    ) -> Result<Self> {
        let path = kind.path(dir, base_offset);
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let scan = scan(&mut file, &path, base_offset)?;
        if scan.torn_bytes > 0 {
            tracing::warn!(
                segment = %path.display(),
                position = scan.position,
                torn_bytes = scan.torn_bytes,
                "truncating partially written tail entry"
            );
            file.set_len(scan.position)?;
        }

        Ok(Self {
            base_offset,
            max_bytes,
            state: Mutex::new(SegmentState {
                file: Some(file),
                path,
                kind,
                next_offset: scan.next_offset,
                position: scan.position,
            }),
        })
    }

    /// Create an empty file of the given kind, discarding any leftover one
    pub fn create_kind(
        dir: &Path,
        base_offset: u64,
        max_bytes: u64,
        kind: SegmentFileKind,
    ) -> Result<Self> {
        match fs::remove_file(kind.path(dir, base_offset)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Self::open_kind(dir, base_offset, max_bytes, kind)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the next appended entry will receive
    pub fn next_offset(&self) -> u64 {
        self.state.lock().next_offset
    }

    /// Current write position in bytes
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    pub fn kind(&self) -> SegmentFileKind {
        self.state.lock().kind
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().position >= self.max_bytes
    }

    // =========================================================================
    // I/O
    // =========================================================================

    /// Append one encoded entry
    ///
    /// `next_offset` moves past the offset stored in the entry, which for the
    /// append path is exactly one more than before.
    pub fn write(&self, encoded: &[u8]) -> Result<usize> {
        if encoded.len() < HEADER_SIZE {
            return Err(XlogError::MalformedEntry(format!(
                "cannot write {} bytes, shorter than a header",
                encoded.len()
            )));
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&encoded[..HEADER_SIZE]);
        let offset = EntryHeader::decode(&header).offset;

        let mut state = self.state.lock();
        let position = state.position;
        let file = state.file(self.base_offset)?;
        if let Err(e) = file.write_all(encoded) {
            // Cut any partial bytes so the next append starts on an entry boundary
            if let Err(truncate_err) = file.set_len(position) {
                tracing::error!(
                    base_offset = self.base_offset,
                    position,
                    "failed to truncate after short write: {}",
                    truncate_err
                );
            }
            return Err(e.into());
        }
        state.next_offset = offset + 1;
        state.position += encoded.len() as u64;
        Ok(encoded.len())
    }

    /// Random-access read, independent of the append cursor
    ///
    /// Returns 0 at or past the end of the file.
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> Result<usize> {
        let mut state = self.state.lock();
        let file = state.file(self.base_offset)?;
        file.seek(SeekFrom::Start(position))?;
        Ok(read_full(file, buf)?)
    }

    /// Byte position of the entry carrying `offset`
    ///
    /// Linear scan over entry headers. The offset one past the last entry
    /// resolves to the end of the segment.
    pub fn find_offset_position(&self, offset: u64) -> Result<u64> {
        let mut state = self.state.lock();
        let next_offset = state.next_offset;
        let end = state.position;
        let file = state.file(self.base_offset)?;
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);

        let mut position = 0u64;
        while position < end {
            let mut header_bytes = [0u8; HEADER_SIZE];
            if read_full(&mut reader, &mut header_bytes)? < HEADER_SIZE {
                break;
            }
            let header = EntryHeader::decode(&header_bytes);
            if header.offset == offset {
                tracing::debug!(offset, position, base_offset = self.base_offset, "found offset position");
                return Ok(position);
            }
            if header.offset > offset {
                break;
            }
            reader.seek_relative(header.size as i64)?;
            position += header.entry_len();
        }

        if offset == next_offset {
            return Ok(end);
        }
        Err(XlogError::OffsetNotFound(offset))
    }

    /// Flush written entries to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file(self.base_offset)?.sync_all()?;
        Ok(())
    }

    /// Sync and release the file handle; later I/O fails with `SegmentClosed`
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(file) = state.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    // =========================================================================
    // Compaction Support
    // =========================================================================

    /// Rename the underlying file to the given kind; the handle stays open
    pub(crate) fn rename(&self, kind: SegmentFileKind) -> Result<()> {
        let mut state = self.state.lock();
        let dir = state
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let new_path = kind.path(&dir, self.base_offset);
        fs::rename(&state.path, &new_path)?;
        tracing::debug!(from = %state.path.display(), to = %new_path.display(), "renamed segment file");
        state.path = new_path;
        state.kind = kind;
        Ok(())
    }

    /// Unlink the underlying file
    ///
    /// Open handles elsewhere keep reading the unlinked bytes.
    pub(crate) fn remove_file(&self) -> Result<()> {
        let state = self.state.lock();
        fs::remove_file(&state.path)?;
        Ok(())
    }

    pub(crate) fn modified(&self) -> Result<SystemTime> {
        let mut state = self.state.lock();
        Ok(state.file(self.base_offset)?.metadata()?.modified()?)
    }

    pub(crate) fn set_modified(&self, modified: SystemTime) -> Result<()> {
        let mut state = self.state.lock();
        let times = FileTimes::new()
            .set_accessed(SystemTime::now())
            .set_modified(modified);
        state.file(self.base_offset)?.set_times(times)?;
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Segment")
            .field("path", &state.path)
            .field("base_offset", &self.base_offset)
            .field("next_offset", &state.next_offset)
            .field("position", &state.position)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

// =============================================================================
// Open-time Scan
// =============================================================================

/// Walk every entry from byte 0
///
/// A short header or body at the very end of the file is a torn write and
/// ends the scan; anything else that fails to decode is corruption.
fn scan(file: &mut File, path: &Path, base_offset: u64) -> Result<ScanResult> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&*file);

    let corrupt = |position: u64, reason: String| XlogError::Corruption {
        path: path.to_path_buf(),
        position,
        reason,
    };

    let mut position = 0u64;
    let mut next_offset = base_offset;
    while position < file_len {
        let remaining = file_len - position;
        if remaining < HEADER_SIZE as u64 {
            break;
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = EntryHeader::decode(&header_bytes);
        header
            .validate()
            .map_err(|e| corrupt(position, e.to_string()))?;
        if header.offset < next_offset {
            return Err(corrupt(
                position,
                format!("offset {} does not follow {}", header.offset, next_offset),
            ));
        }
        if remaining < header.entry_len() {
            let mut partial = vec![0u8; (remaining - HEADER_SIZE as u64) as usize];
            reader.read_exact(&mut partial)?;
            check_partial_body(&header, &partial).map_err(|reason| corrupt(position, reason))?;
            break;
        }

        let mut body = vec![0u8; header.size as usize];
        reader.read_exact(&mut body)?;
        LogEntry::decode_body(&header, &body).map_err(|e| corrupt(position, e.to_string()))?;

        position += header.entry_len();
        next_offset = header.offset + 1;
    }

    Ok(ScanResult {
        next_offset,
        position,
        torn_bytes: file_len - position,
    })
}

/// A body cut short by end of file is only a torn write if the length
/// prefixes that made it to disk agree with the declared size
fn check_partial_body(header: &EntryHeader, mut partial: &[u8]) -> std::result::Result<(), String> {
    let prefixes = LENGTH_PREFIXES as u64;
    let size = header.size as u64;
    if partial.remaining() < 4 {
        return Ok(());
    }
    let key_len = partial.get_u32() as u64;
    if prefixes + key_len > size {
        return Err(format!("key length {} does not fit declared size {}", key_len, size));
    }
    if partial.remaining() < key_len as usize + 4 {
        return Ok(());
    }
    partial.advance(key_len as usize);
    let value_len = partial.get_u32() as u64;
    if prefixes + key_len + value_len != size {
        return Err(format!(
            "key length {} and value length {} disagree with declared size {}",
            key_len, value_len, size
        ));
    }
    Ok(())
}
