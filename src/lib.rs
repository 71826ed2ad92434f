//! # xlog
//!
//! A segmented, compacting commit log that durably buffers the records
//! flowing through a replication pipeline:
//! - Fixed-layout binary entries, offsets assigned by the log
//! - Size-based segment rotation
//! - Offset-indexed readers that cross segment boundaries
//! - Namespace compaction with a crash-safe file swap
//! - Per-consumer offset tracking to drive compaction safely
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐         ┌──────────────────────┐
//! │   Source adaptors    │         │    Sink adaptors     │
//! │      (append)        │         │  (reader + commits)  │
//! └──────────┬───────────┘         └───────┬──────┬───────┘
//!            │                             │      │
//! ┌──────────▼─────────────────────────────▼──┐ ┌─▼──────────────┐
//! │               CommitLog                   │ │ OffsetManager  │
//! │   (single writer / many readers)          │ │ (own commit    │
//! └──────────┬────────────────────────────────┘ │  log per sink) │
//!            │                                  └──────┬─────────┘
//!   ┌────────┴────────┬───────────────┐                │ safe offset
//!   ▼                 ▼               ▼                ▼
//! ┌───────────┐ ┌───────────┐ ┌───────────┐   ┌─────────────────────┐
//! │ Segment 0 │ │ Segment N │ │  Active   │◄──│ CompactionScheduler │
//! │  (.log)   │ │  (.log)   │ │  Segment  │   │ NamespaceCompactor  │
//! └───────────┘ └───────────┘ └───────────┘   └─────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod commitlog;
pub mod offset;
pub mod scheduler;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use commitlog::{CommitLog, LogEntry, Mode, Operation, Reader};
pub use config::Config;
pub use error::{Result, XlogError};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of xlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
