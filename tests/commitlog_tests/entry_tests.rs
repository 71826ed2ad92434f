//! Tests for the entry codec
//!
//! These tests verify:
//! - The exact on-disk byte layout
//! - Attribute packing for every mode/operation
//! - Stream decoding of complete, short and malformed input

use std::io::Cursor;

use xlog::commitlog::{put_offset, read_entry, EntryHeader, LogEntry, Mode, Operation, HEADER_SIZE};
use xlog::XlogError;

fn sample_entry() -> LogEntry {
    LogEntry::new("key", "value", 1491252302, Mode::Copy, Operation::Insert)
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_encode_golden_bytes() {
    let encoded = sample_entry().encode(0);

    let mut expected = vec![0u8; 8]; // offset
    expected.extend_from_slice(&[0, 0, 0, 16]); // size
    expected.extend_from_slice(&[0, 0, 0, 0, 88, 226, 180, 78]); // timestamp
    expected.push(0); // attributes
    expected.extend_from_slice(&[0, 0, 0, 3]);
    expected.extend_from_slice(b"key");
    expected.extend_from_slice(&[0, 0, 0, 5]);
    expected.extend_from_slice(b"value");

    assert_eq!(&encoded[..], &expected[..]);
    assert_eq!(encoded.len(), 37);
    assert_eq!(sample_entry().encoded_len(), 37);
}

#[test]
fn test_encode_offset_is_big_endian() {
    let encoded = sample_entry().encode(0x0102_0304_0506_0708);
    assert_eq!(&encoded[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_size_covers_key_value_block() {
    let entry = LogEntry::new(vec![], vec![], 0, Mode::Copy, Operation::Insert);
    assert_eq!(entry.body_size(), 8);
    assert_eq!(entry.encoded_len(), HEADER_SIZE + 8);

    let entry = LogEntry::new(vec![1u8; 10], vec![2u8; 100], 0, Mode::Copy, Operation::Insert);
    assert_eq!(entry.body_size(), 118);
}

#[test]
fn test_update_operation_sets_attribute_bit() {
    let entry = LogEntry::new("key", "value", 1491252302, Mode::Copy, Operation::Update);
    assert_eq!(entry.attributes(), 4);
    assert_eq!(entry.encode(0)[20], 4);
}

#[test]
fn test_attributes_for_every_combination() {
    let modes = [Mode::Copy, Mode::Sync, Mode::Complete];
    let ops = [
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
        Operation::Command,
        Operation::Noop,
        Operation::Skip,
    ];
    for mode in modes {
        for op in ops {
            let entry = LogEntry::new("ns", "v", 1, mode, op);
            let attributes = entry.attributes();
            assert_eq!(attributes & 0b11, mode as u8);
            assert_eq!((attributes >> 2) & 0b111, op as u8);

            let header = EntryHeader::decode(entry.encode(0)[..HEADER_SIZE].try_into().unwrap());
            assert_eq!(header.mode().unwrap(), mode);
            assert_eq!(header.op().unwrap(), op);
        }
    }
}

#[test]
fn test_put_offset_only_touches_offset_bytes() {
    let mut encoded = sample_entry().encode(7).to_vec();
    let original = encoded.clone();

    put_offset(&mut encoded, 500);

    assert_eq!(&encoded[..8], &500u64.to_be_bytes());
    assert_eq!(&encoded[8..], &original[8..]);
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_decode() {
    let encoded = sample_entry().encode(42);
    let header = EntryHeader::decode(encoded[..HEADER_SIZE].try_into().unwrap());

    assert_eq!(header.offset, 42);
    assert_eq!(header.size, 16);
    assert_eq!(header.timestamp, 1491252302);
    assert_eq!(header.attributes, 0);
    assert_eq!(header.entry_len(), 37);
    assert!(header.validate().is_ok());
}

#[test]
fn test_header_rejects_unknown_mode() {
    let header = EntryHeader {
        offset: 0,
        size: 8,
        timestamp: 0,
        attributes: 3,
    };
    assert!(matches!(header.validate(), Err(XlogError::MalformedEntry(_))));
}

#[test]
fn test_header_rejects_unknown_operation() {
    let header = EntryHeader {
        offset: 0,
        size: 8,
        timestamp: 0,
        attributes: 6 << 2,
    };
    assert!(matches!(header.validate(), Err(XlogError::MalformedEntry(_))));
}

#[test]
fn test_header_rejects_reserved_bits() {
    let header = EntryHeader {
        offset: 0,
        size: 8,
        timestamp: 0,
        attributes: 0b1000_0000,
    };
    assert!(matches!(header.validate(), Err(XlogError::MalformedEntry(_))));
}

#[test]
fn test_header_rejects_undersized_body() {
    let header = EntryHeader {
        offset: 0,
        size: 7,
        timestamp: 0,
        attributes: 0,
    };
    assert!(matches!(header.validate(), Err(XlogError::MalformedEntry(_))));
}

// =============================================================================
// Stream Decoding Tests
// =============================================================================

#[test]
fn test_read_entry_sequence() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&sample_entry().encode(0));
    let second = LogEntry::new("db.users", "{\"id\":1}", 99, Mode::Sync, Operation::Delete);
    bytes.extend_from_slice(&second.encode(1));

    let mut cursor = Cursor::new(bytes);
    assert_eq!(read_entry(&mut cursor).unwrap(), Some((0, sample_entry())));
    assert_eq!(read_entry(&mut cursor).unwrap(), Some((1, second)));
    assert_eq!(read_entry(&mut cursor).unwrap(), None);
}

#[test]
fn test_read_entry_short_header_is_none() {
    let encoded = sample_entry().encode(0);
    let mut cursor = Cursor::new(encoded[..HEADER_SIZE - 1].to_vec());
    assert_eq!(read_entry(&mut cursor).unwrap(), None);
}

#[test]
fn test_read_entry_short_body_is_none() {
    let encoded = sample_entry().encode(0);
    let mut cursor = Cursor::new(encoded[..encoded.len() - 1].to_vec());
    assert_eq!(read_entry(&mut cursor).unwrap(), None);
}

#[test]
fn test_read_entry_inconsistent_lengths() {
    let mut encoded = sample_entry().encode(0).to_vec();
    // key_len claims more bytes than the block holds
    encoded[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&100u32.to_be_bytes());

    let mut cursor = Cursor::new(encoded);
    assert!(matches!(read_entry(&mut cursor), Err(XlogError::MalformedEntry(_))));
}

#[test]
fn test_decode_body_rejects_trailing_bytes() {
    let mut encoded = sample_entry().encode(0).to_vec();
    // Shrink value_len so one byte is left over
    let value_len_pos = HEADER_SIZE + 4 + 3;
    encoded[value_len_pos..value_len_pos + 4].copy_from_slice(&4u32.to_be_bytes());

    let header = EntryHeader::decode(encoded[..HEADER_SIZE].try_into().unwrap());
    let result = LogEntry::decode_body(&header, &encoded[HEADER_SIZE..]);
    assert!(matches!(result, Err(XlogError::MalformedEntry(_))));
}

#[test]
fn test_empty_key_and_value() {
    let entry = LogEntry::new(vec![], vec![], 5, Mode::Complete, Operation::Noop);
    let mut cursor = Cursor::new(entry.encode(3).to_vec());
    assert_eq!(read_entry(&mut cursor).unwrap(), Some((3, entry)));
}

#[test]
fn test_display_names() {
    assert_eq!(Mode::Sync.to_string(), "sync");
    assert_eq!(Operation::Command.to_string(), "command");
}
