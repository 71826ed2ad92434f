//! Tests for interrupted compaction recovery
//!
//! Each test lays out the files a crash would leave behind at one step of
//! the swap, then opens the log and checks the outcome.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use xlog::commitlog::{CommitLog, LogEntry, Mode, Operation, SegmentFileKind};
use xlog::XlogError;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_file(dir: &Path, base_offset: u64, kind: SegmentFileKind, offsets: &[u64]) {
    let mut bytes = Vec::new();
    for &offset in offsets {
        let entry = LogEntry::new("ns", format!("v{}", offset), 0, Mode::Copy, Operation::Insert);
        bytes.extend_from_slice(&entry.encode(offset));
    }
    fs::write(kind.path(dir, base_offset), bytes).unwrap();
}

/// Original segment 0 (offsets 0..4) and active segment 4
fn write_original(dir: &Path) {
    write_file(dir, 0, SegmentFileKind::Log, &[0, 1, 2, 3]);
    write_file(dir, 4, SegmentFileKind::Log, &[4]);
}

fn offsets(log: &CommitLog) -> Vec<u64> {
    log.new_reader(-1)
        .unwrap()
        .entries()
        .map(|e| e.unwrap().0)
        .collect()
}

fn exists(dir: &Path, base_offset: u64, kind: SegmentFileKind) -> bool {
    kind.path(dir, base_offset).exists()
}

// =============================================================================
// Recognized States
// =============================================================================

#[test]
fn test_swap_next_to_log_finishes_swap() {
    let temp = TempDir::new().unwrap();
    write_original(temp.path());
    write_file(temp.path(), 0, SegmentFileKind::Swap, &[3]);

    let log = CommitLog::open(temp.path(), 1024).unwrap();

    assert_eq!(offsets(&log), vec![3, 4]);
    assert!(exists(temp.path(), 0, SegmentFileKind::Log));
    assert!(!exists(temp.path(), 0, SegmentFileKind::Swap));
    assert!(!exists(temp.path(), 0, SegmentFileKind::Deleted));
}

#[test]
fn test_swap_next_to_deleted_restores_log() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), 0, SegmentFileKind::Deleted, &[0, 1, 2, 3]);
    write_file(temp.path(), 0, SegmentFileKind::Swap, &[2, 3]);
    write_file(temp.path(), 4, SegmentFileKind::Log, &[4]);

    let log = CommitLog::open(temp.path(), 1024).unwrap();

    assert_eq!(offsets(&log), vec![2, 3, 4]);
    assert!(!exists(temp.path(), 0, SegmentFileKind::Swap));
    assert!(!exists(temp.path(), 0, SegmentFileKind::Deleted));
}

#[test]
fn test_deleted_next_to_log_is_removed() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), 0, SegmentFileKind::Log, &[1, 3]);
    write_file(temp.path(), 0, SegmentFileKind::Deleted, &[0, 1, 2, 3]);
    write_file(temp.path(), 4, SegmentFileKind::Log, &[4]);

    let log = CommitLog::open(temp.path(), 1024).unwrap();

    assert_eq!(offsets(&log), vec![1, 3, 4]);
    assert!(!exists(temp.path(), 0, SegmentFileKind::Deleted));
}

#[test]
fn test_cleaned_is_left_in_place() {
    let temp = TempDir::new().unwrap();
    write_original(temp.path());
    write_file(temp.path(), 0, SegmentFileKind::Cleaned, &[3]);

    let log = CommitLog::open(temp.path(), 1024).unwrap();

    assert_eq!(offsets(&log), vec![0, 1, 2, 3, 4]);
    assert!(exists(temp.path(), 0, SegmentFileKind::Cleaned));
}

#[test]
fn test_clean_directory_untouched() {
    let temp = TempDir::new().unwrap();
    write_original(temp.path());

    let log = CommitLog::open(temp.path(), 1024).unwrap();

    assert_eq!(offsets(&log), vec![0, 1, 2, 3, 4]);
    assert_eq!(log.newest_offset(), 5);
}

// =============================================================================
// Conflicting States
// =============================================================================

#[test]
fn test_lone_swap_is_conflict() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), 0, SegmentFileKind::Swap, &[3]);

    assert!(matches!(
        CommitLog::open(temp.path(), 1024),
        Err(XlogError::RecoveryConflict { base_offset: 0, .. })
    ));
}

#[test]
fn test_lone_deleted_is_conflict() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), 4, SegmentFileKind::Log, &[4]);
    write_file(temp.path(), 0, SegmentFileKind::Deleted, &[0, 1]);

    assert!(matches!(
        CommitLog::open(temp.path(), 1024),
        Err(XlogError::RecoveryConflict { base_offset: 0, .. })
    ));
}

#[test]
fn test_all_three_files_is_conflict() {
    let temp = TempDir::new().unwrap();
    write_original(temp.path());
    write_file(temp.path(), 0, SegmentFileKind::Swap, &[3]);
    write_file(temp.path(), 0, SegmentFileKind::Deleted, &[0, 1, 2, 3]);

    let err = CommitLog::open(temp.path(), 1024).unwrap_err();
    assert!(matches!(err, XlogError::RecoveryConflict { base_offset: 0, .. }));

    // Nothing was touched
    assert!(exists(temp.path(), 0, SegmentFileKind::Log));
    assert!(exists(temp.path(), 0, SegmentFileKind::Swap));
    assert!(exists(temp.path(), 0, SegmentFileKind::Deleted));
}
