//! Tests for CommitLog
//!
//! These tests verify:
//! - Opening/creating log directories
//! - Offset assignment and monotonicity
//! - Size-based segment rotation
//! - Persistence across reopen

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use xlog::commitlog::{CommitLog, Mode, Operation};
use xlog::{Config, XlogError};

/// Encoded size of an entry with a 1-byte key and 1-byte value
const SMALL_ENTRY: u64 = 31;

// =============================================================================
// Helper Functions
// =============================================================================

fn append_small(log: &CommitLog, n: usize) -> Vec<u64> {
    (0..n)
        .map(|_| log.append(b"k", b"v", 1, Mode::Sync, Operation::Insert).unwrap())
        .collect()
}

// =============================================================================
// Open/Create Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("log");
    assert!(!path.exists());

    let log = CommitLog::open(&path, 1024).unwrap();

    assert!(path.is_dir());
    assert!(path.join("00000000000000000000.log").exists());
    assert_eq!(log.segments().len(), 1);
    assert_eq!(log.newest_offset(), 0);
    assert_eq!(log.oldest_offset(), 0);
}

#[test]
fn test_open_empty_path_fails() {
    assert!(matches!(CommitLog::open("", 1024), Err(XlogError::EmptyPath)));
}

#[test]
fn test_with_config() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .log_dir(temp.path())
        .max_segment_bytes(4096)
        .build();

    let log = CommitLog::with_config(&config).unwrap();
    assert_eq!(log.path(), temp.path());
    assert_eq!(log.max_segment_bytes(), 4096);
}

#[test]
fn test_ignores_unrelated_files() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("README"), b"hello").unwrap();
    std::fs::create_dir(temp.path().join("subdir.log")).unwrap();

    let log = CommitLog::open(temp.path(), 1024).unwrap();
    assert_eq!(log.segments().len(), 1);
}

#[test]
fn test_invalid_segment_name_fails() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("garbage.log"), b"").unwrap();

    assert!(matches!(
        CommitLog::open(temp.path(), 1024),
        Err(XlogError::InvalidFileName(_))
    ));
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_assigns_consecutive_offsets() {
    let temp = TempDir::new().unwrap();
    let log = CommitLog::open(temp.path(), 1024 * 1024).unwrap();

    let offsets = append_small(&log, 100);

    assert_eq!(offsets, (0..100).collect::<Vec<_>>());
    assert_eq!(log.newest_offset(), 100);
}

#[test]
fn test_concurrent_appends_get_unique_offsets() {
    let temp = TempDir::new().unwrap();
    let log = Arc::new(CommitLog::open(temp.path(), 1024).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let log = Arc::clone(&log);
            thread::spawn(move || append_small(&log, 100))
        })
        .collect();

    let mut offsets = HashSet::new();
    for handle in handles {
        for offset in handle.join().unwrap() {
            assert!(offsets.insert(offset), "offset {} assigned twice", offset);
        }
    }

    assert_eq!(offsets.len(), 400);
    assert_eq!(log.newest_offset(), 400);
    assert_eq!(log.new_reader(-1).unwrap().entries().count(), 400);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotation_by_size() {
    let temp = TempDir::new().unwrap();
    // Four entries fill a segment
    let log = CommitLog::open(temp.path(), 100).unwrap();

    append_small(&log, 10);

    let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset()).collect();
    assert_eq!(bases, vec![0, 4, 8]);
    assert_eq!(log.segments()[0].position(), 4 * SMALL_ENTRY);
    assert_eq!(log.segments()[2].next_offset(), 10);
    assert!(temp.path().join("00000000000000000004.log").exists());
    assert!(temp.path().join("00000000000000000008.log").exists());
}

#[test]
fn test_segment_may_exceed_max_by_one_entry() {
    let temp = TempDir::new().unwrap();
    let log = CommitLog::open(temp.path(), 10).unwrap();

    append_small(&log, 2);

    let segments = log.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].position(), SMALL_ENTRY);
    assert_eq!(segments[1].base_offset(), 1);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_offsets() {
    let temp = TempDir::new().unwrap();
    {
        let log = CommitLog::open(temp.path(), 100).unwrap();
        append_small(&log, 10);
        log.close().unwrap();
    }

    let log = CommitLog::open(temp.path(), 100).unwrap();
    assert_eq!(log.segments().len(), 3);
    assert_eq!(log.newest_offset(), 10);
    assert_eq!(log.oldest_offset(), 0);

    assert_eq!(log.append(b"k", b"v", 1, Mode::Sync, Operation::Insert).unwrap(), 10);
}

#[test]
fn test_close_rejects_appends() {
    let temp = TempDir::new().unwrap();
    let log = CommitLog::open(temp.path(), 1024).unwrap();
    log.close().unwrap();

    assert!(matches!(
        log.append(b"k", b"v", 1, Mode::Sync, Operation::Insert),
        Err(XlogError::SegmentClosed(0))
    ));
}

#[test]
fn test_delete_all_removes_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("log");
    let log = CommitLog::open(&path, 100).unwrap();
    append_small(&log, 10);

    log.delete_all().unwrap();

    assert!(!path.exists());
}
