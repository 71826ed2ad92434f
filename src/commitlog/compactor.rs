//! Segment Compaction
//!
//! Rewrites rotated segments keeping only the newest entry per key (the
//! record namespace), then swaps the rewritten file in.
//!
//! ## Invariants
//!
//! - A segment holding any offset at or past the safe offset is never touched
//! - The active segment is never touched
//! - The replacement keeps the original's modification time

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use crate::error::{Result, XlogError};

use super::commit_log::CommitLog;
use super::entry::{read_entry, LogEntry};
use super::segment::{Segment, SegmentFileKind};

/// Performs compaction of log segments
pub trait Compactor {
    /// Compact each of `segments` whose entries all lie below `safe_offset`
    fn compact(&self, safe_offset: u64, segments: &[Arc<Segment>]) -> CompactionReport;
}

/// Why a segment was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The segment is the log's write target
    Active,
    /// The segment holds an offset consumers may still need
    Unsafe { offset: u64 },
    /// Every key appears once; rewriting would reclaim nothing
    NothingToReclaim,
}

/// Stats for one rewritten segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedSegment {
    pub base_offset: u64,
    pub entries_before: usize,
    pub entries_after: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl CompactedSegment {
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

enum SegmentOutcome {
    Compacted(CompactedSegment),
    Skipped(SkipReason),
}

/// Result of a compaction pass
#[derive(Debug, Default)]
pub struct CompactionReport {
    pub compacted: Vec<CompactedSegment>,
    pub skipped: Vec<(u64, SkipReason)>,
    pub failed: Vec<(u64, XlogError)>,
}

impl CompactionReport {
    fn record(&mut self, base_offset: u64, outcome: Result<SegmentOutcome>) {
        match outcome {
            Ok(SegmentOutcome::Compacted(stats)) => self.compacted.push(stats),
            Ok(SegmentOutcome::Skipped(reason)) => self.skipped.push((base_offset, reason)),
            Err(e) => self.failed.push((base_offset, e)),
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.compacted.iter().map(CompactedSegment::bytes_saved).sum()
    }
}

/// Compacts segments keyed by the source namespace
pub struct NamespaceCompactor<'a> {
    log: &'a CommitLog,
}

impl<'a> NamespaceCompactor<'a> {
    pub fn new(log: &'a CommitLog) -> Self {
        Self { log }
    }

    fn compact_segment(&self, safe_offset: u64, segment: &Arc<Segment>) -> Result<SegmentOutcome> {
        let base_offset = segment.base_offset();
        if self.log.is_active(segment) {
            return Ok(SegmentOutcome::Skipped(SkipReason::Active));
        }

        // Later writes for a key supersede earlier ones
        let mut latest: HashMap<Vec<u8>, (u64, LogEntry)> = HashMap::new();
        let mut entries_before = 0usize;
        let mut cursor = SegmentCursor::new(segment);
        while let Some((offset, entry)) = read_entry(&mut cursor)? {
            if offset >= safe_offset {
                tracing::info!(
                    segment = %segment.path().display(),
                    offset,
                    safe_offset,
                    "unable to compact segment, contains unread offset"
                );
                return Ok(SegmentOutcome::Skipped(SkipReason::Unsafe { offset }));
            }
            entries_before += 1;
            latest.insert(entry.key.clone(), (offset, entry));
        }

        if latest.len() == entries_before {
            return Ok(SegmentOutcome::Skipped(SkipReason::NothingToReclaim));
        }

        let mut survivors: Vec<(u64, LogEntry)> = latest.into_values().collect();
        survivors.sort_unstable_by_key(|(offset, _)| *offset);

        let cleaned = Segment::create_kind(
            self.log.path(),
            base_offset,
            self.log.max_segment_bytes(),
            SegmentFileKind::Cleaned,
        )?;
        for (offset, entry) in &survivors {
            cleaned.write(&entry.encode(*offset))?;
        }
        cleaned.sync()?;
        cleaned.set_modified(segment.modified()?)?;

        let stats = CompactedSegment {
            base_offset,
            entries_before,
            entries_after: survivors.len(),
            bytes_before: segment.position(),
            bytes_after: cleaned.position(),
        };

        self.log.replace_segment(Arc::new(cleaned), segment)?;
        tracing::info!(
            base_offset,
            entries_before = stats.entries_before,
            entries_after = stats.entries_after,
            bytes_saved = stats.bytes_saved(),
            "compaction complete"
        );
        Ok(SegmentOutcome::Compacted(stats))
    }
}

impl Compactor for NamespaceCompactor<'_> {
    fn compact(&self, safe_offset: u64, segments: &[Arc<Segment>]) -> CompactionReport {
        tracing::info!(num_segments = segments.len(), safe_offset, "starting compaction");

        // Segments are independent, so each one gets its own thread
        let outcomes = crossbeam::scope(|scope| {
            let handles: Vec<_> = segments
                .iter()
                .map(|segment| {
                    let handle = scope.spawn(move |_| self.compact_segment(safe_offset, segment));
                    (segment.base_offset(), handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(base_offset, handle)| {
                    let outcome = handle
                        .join()
                        .unwrap_or(Err(XlogError::CompactionPanicked(base_offset)));
                    (base_offset, outcome)
                })
                .collect::<Vec<_>>()
        });

        let mut report = CompactionReport::default();
        match outcomes {
            Ok(outcomes) => {
                for (base_offset, outcome) in outcomes {
                    if let Err(e) = &outcome {
                        tracing::error!(base_offset, "failed to compact segment: {}", e);
                    }
                    report.record(base_offset, outcome);
                }
            }
            Err(_) => tracing::error!("compaction worker panicked"),
        }
        report
    }
}

/// Sequential `Read` over one segment from byte 0
struct SegmentCursor<'a> {
    segment: &'a Segment,
    position: u64,
}

impl<'a> SegmentCursor<'a> {
    fn new(segment: &'a Segment) -> Self {
        Self {
            segment,
            position: 0,
        }
    }
}

impl Read for SegmentCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .segment
            .read_at(buf, self.position)
            .map_err(io::Error::other)?;
        self.position += n as u64;
        Ok(n)
    }
}
