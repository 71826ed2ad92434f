//! Compaction Recovery
//!
//! Resolves compactions interrupted mid-swap before segments are loaded.
//!
//! A compaction swaps a segment in with four steps:
//! ```text
//!   (a) NNN.cleaned -> NNN.swap
//!   (b) NNN.log     -> NNN.deleted
//!   (c) NNN.swap    -> NNN.log
//!   (d) remove NNN.deleted
//! ```
//! The set of files present for a base offset tells which step a crash
//! interrupted. Every recognized set is finished deterministically; any other
//! combination refuses to open.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, XlogError};

use super::segment::SegmentFileKind;

/// Which files exist for one base offset
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FileSet {
    log: bool,
    cleaned: bool,
    swap: bool,
    deleted: bool,
}

impl FileSet {
    fn insert(&mut self, kind: SegmentFileKind) {
        match kind {
            SegmentFileKind::Log => self.log = true,
            SegmentFileKind::Cleaned => self.cleaned = true,
            SegmentFileKind::Swap => self.swap = true,
            SegmentFileKind::Deleted => self.deleted = true,
        }
    }

    fn describe(&self) -> String {
        SegmentFileKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                SegmentFileKind::Log => self.log,
                SegmentFileKind::Cleaned => self.cleaned,
                SegmentFileKind::Swap => self.swap,
                SegmentFileKind::Deleted => self.deleted,
            })
            .map(SegmentFileKind::suffix)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Phase of a (possibly interrupted) compaction for one base offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompactionPhase {
    /// Only `.log`: nothing in flight
    Original,
    /// `.log` + `.cleaned`: replacement never verified, left for the next pass
    Cleaned,
    /// `.log` + `.swap`: crashed between (a) and (b)
    Swapped,
    /// `.swap` + `.deleted`: crashed between (b) and (c)
    Deleted,
    /// `.log` + `.deleted`: crashed between (c) and (d)
    PendingRemoval,
}

impl CompactionPhase {
    fn classify(base_offset: u64, files: FileSet) -> Result<Self> {
        let FileSet {
            log,
            cleaned,
            swap,
            deleted,
        } = files;
        match (log, cleaned, swap, deleted) {
            (true, false, false, false) => Ok(CompactionPhase::Original),
            (true, true, false, false) => Ok(CompactionPhase::Cleaned),
            (true, false, true, false) => Ok(CompactionPhase::Swapped),
            (false, false, true, true) => Ok(CompactionPhase::Deleted),
            (true, false, false, true) => Ok(CompactionPhase::PendingRemoval),
            _ => Err(XlogError::RecoveryConflict {
                base_offset,
                files: files.describe(),
            }),
        }
    }

    /// Finish whatever steps remain for this phase
    fn resolve(self, dir: &Path, base_offset: u64) -> Result<()> {
        let log = SegmentFileKind::Log.path(dir, base_offset);
        let swap = SegmentFileKind::Swap.path(dir, base_offset);
        let deleted = SegmentFileKind::Deleted.path(dir, base_offset);

        match self {
            CompactionPhase::Original => {}
            CompactionPhase::Cleaned => {
                tracing::info!(base_offset, "leaving unverified cleaned segment in place");
            }
            CompactionPhase::Swapped => {
                tracing::info!(base_offset, "finishing interrupted swap");
                fs::rename(&log, &deleted)?;
                fs::rename(&swap, &log)?;
                fs::remove_file(&deleted)?;
            }
            CompactionPhase::Deleted => {
                tracing::info!(base_offset, "restoring swapped segment");
                fs::rename(&swap, &log)?;
                fs::remove_file(&deleted)?;
            }
            CompactionPhase::PendingRemoval => {
                tracing::info!(base_offset, "removing replaced segment");
                fs::remove_file(&deleted)?;
            }
        }
        Ok(())
    }
}

/// Resolve every interrupted compaction in `dir`
///
/// Returns the base offsets that have a `.log` file afterwards, ascending.
pub(crate) fn recover(dir: &Path) -> Result<Vec<u64>> {
    let mut sets: BTreeMap<u64, FileSet> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(parsed) = SegmentFileKind::parse(name) {
            let (base_offset, kind) = parsed?;
            sets.entry(base_offset).or_default().insert(kind);
        }
    }

    let mut base_offsets = Vec::with_capacity(sets.len());
    for (base_offset, files) in sets {
        let phase = CompactionPhase::classify(base_offset, files)?;
        phase.resolve(dir, base_offset)?;
        base_offsets.push(base_offset);
    }
    Ok(base_offsets)
}
