//! Log Reader
//!
//! A cursor over a commit log that crosses segment boundaries transparently.

use std::io::{self, Read};
use std::sync::Arc;

use crate::error::Result;

use super::commit_log::CommitLog;
use super::entry::{EntryHeader, LogEntry, HEADER_SIZE};
use super::segment::Segment;

/// Reads bytes or entries from a commit log, starting at a fixed position
///
/// The reader keeps its own handle on the current segment, so a segment
/// swapped out by compaction keeps serving the bytes the cursor points into.
pub struct Reader<'a> {
    log: &'a CommitLog,
    idx: usize,
    segment: Arc<Segment>,
    position: u64,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(log: &'a CommitLog, idx: usize, segment: Arc<Segment>, position: u64) -> Self {
        Self {
            log,
            idx,
            segment,
            position,
        }
    }

    /// Index of the current segment in the log's segment list
    pub fn segment_index(&self) -> usize {
        self.idx
    }

    /// Byte position within the current segment
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Called at the end of the current segment; returns whether to read again
    ///
    /// The writer may have appended to this segment between our last read
    /// and its rotation. Once a successor exists the segment takes no more
    /// writes, so we only move on after its bytes are exhausted.
    fn advance(&mut self) -> bool {
        let segments = self.log.segments();
        let Some(next) = segments.get(self.idx + 1) else {
            return false;
        };
        if self.segment.position() > self.position {
            return true;
        }
        self.idx += 1;
        self.segment = Arc::clone(next);
        self.position = 0;
        true
    }

    /// Decode the entry at the cursor
    ///
    /// Returns `Ok(None)` when there is nothing complete to read yet. The
    /// cursor only moves past whole entries, so a call that races the writer
    /// can simply be retried later.
    pub fn next_entry(&mut self) -> Result<Option<(u64, LogEntry)>> {
        loop {
            let mut header_bytes = [0u8; HEADER_SIZE];
            let n = self.segment.read_at(&mut header_bytes, self.position)?;
            if n == 0 && self.advance() {
                continue;
            }
            if n < HEADER_SIZE {
                return Ok(None);
            }

            let header = EntryHeader::decode(&header_bytes);
            header.validate()?;
            let mut body = vec![0u8; header.size as usize];
            let body_start = self.position + HEADER_SIZE as u64;
            if self.segment.read_at(&mut body, body_start)? < body.len() {
                return Ok(None);
            }

            let entry = LogEntry::decode_body(&header, &body)?;
            self.position += header.entry_len();
            return Ok(Some((header.offset, entry)));
        }
    }

    /// Iterate over every entry from the cursor to the current end of the log
    pub fn entries(self) -> Entries<'a> {
        Entries {
            reader: self,
            failed: false,
        }
    }
}

impl Read for Reader<'_> {
    /// Fill `buf` from the current segment, continuing into later segments
    ///
    /// Returns 0 only when the newest segment has nothing more to give.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .segment
                .read_at(&mut buf[filled..], self.position)
                .map_err(io::Error::other)?;
            if n > 0 {
                filled += n;
                self.position += n as u64;
                continue;
            }
            if !self.advance() {
                break;
            }
        }
        Ok(filled)
    }
}

/// Iterator over log entries
pub struct Entries<'a> {
    reader: Reader<'a>,
    /// Stop after the first error instead of repeating it
    failed: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<(u64, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.reader.next_entry().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}
