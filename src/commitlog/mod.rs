//! Commit Log Module
//!
//! Durably buffers every record flowing through the pipeline so that a
//! restarted sink can resume from the exact offset it left off at.
//!
//! ## Responsibilities
//! - Assign offsets and append entries to the active segment
//! - Rotate segments by size
//! - Offset-indexed reads across segment boundaries
//! - Namespace compaction of rotated segments, crash-safe swap
//!
//! ## Directory Layout
//! ```text
//! {log_dir}/
//!   00000000000000000000.log       segment, base offset 0
//!   00000000000000028340.log       segment, base offset 28340 (active)
//!   00000000000000000000.cleaned   compacted copy, unverified
//!   00000000000000000000.swap      compacted copy, ready to replace
//!   00000000000000000000.deleted   original, pending removal
//! ```
//!
//! ## Entry Format (big-endian)
//! ```text
//! ┌────────────┬──────────┬───────────────┬──────────┐
//! │ Offset (8) │ Size (4) │ Timestamp (8) │ Attr (1) │
//! ├────────────┴──────────┴───────────────┴──────────┤
//! │ KeyLen (4) │ Key │ ValueLen (4) │ Value           │
//! └──────────────────────────────────────────────────┘
//! Size    = length of the key/value block
//! Attr    = mode in bits 0-1, operation in bits 2-4
//! ```

mod commit_log;
mod compactor;
mod entry;
mod reader;
mod recovery;
mod segment;

pub use commit_log::CommitLog;
pub use compactor::{CompactedSegment, CompactionReport, Compactor, NamespaceCompactor, SkipReason};
pub use entry::{put_offset, read_entry, EntryHeader, LogEntry, Mode, Operation, HEADER_SIZE};
pub use reader::{Entries, Reader};
pub use segment::{Segment, SegmentFileKind};
