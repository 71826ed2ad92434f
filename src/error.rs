//! Error types for xlog
//!
//! Provides a unified error type for all commit log operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using XlogError
pub type Result<T> = std::result::Result<T, XlogError>;

/// Unified error type for xlog operations
#[derive(Debug, Error)]
pub enum XlogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // On-disk Format Errors
    // -------------------------------------------------------------------------
    #[error("corrupt entry in {} at byte {position}: {reason}", path.display())]
    Corruption {
        path: PathBuf,
        position: u64,
        reason: String,
    },

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("invalid log file name: {0}")]
    InvalidFileName(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("offset {0} not found")]
    OffsetNotFound(u64),

    #[error("segment with base offset {0} not found")]
    SegmentNotFound(u64),

    #[error("segment with base offset {0} is closed")]
    SegmentClosed(u64),

    // -------------------------------------------------------------------------
    // Compaction / Recovery Errors
    // -------------------------------------------------------------------------
    #[error("unrecoverable compaction state for base offset {base_offset}: found {files}")]
    RecoveryConflict { base_offset: u64, files: String },

    #[error("compaction of segment {0} panicked")]
    CompactionPanicked(u64),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("path is empty")]
    EmptyPath,

    #[error("Configuration error: {0}")]
    Config(String),
}
