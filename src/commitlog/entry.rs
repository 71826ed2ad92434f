//! Log entry definitions
//!
//! Defines the structure of individual commit log entries and the
//! fixed-layout codec used to persist them.

use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, XlogError};

// =============================================================================
// Layout Constants
// =============================================================================

/// Header size: Offset (8) + Size (4) + Timestamp (8) + Attributes (1) = 21 bytes
pub const HEADER_SIZE: usize = 21;

const OFFSET_POS: usize = 0;
const SIZE_POS: usize = 8;
const TIMESTAMP_POS: usize = 12;
const ATTR_POS: usize = 20;

/// Bits 0-1 of the attribute byte
const MODE_MASK: u8 = 0b0000_0011;
/// Bits 2-4 of the attribute byte
const OP_MASK: u8 = 0b0001_1100;
const OP_SHIFT: u8 = 2;

/// Both length prefixes inside the key/value block
pub(crate) const LENGTH_PREFIXES: usize = 8;

// =============================================================================
// Mode / Operation
// =============================================================================

/// Phase of the producing reader when the entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Mode {
    /// Initial bulk copy
    #[default]
    Copy = 0,
    /// Live tail
    Sync = 1,
    /// Namespace finished
    Complete = 2,
}

impl Mode {
    fn from_attributes(attributes: u8) -> Option<Self> {
        match attributes & MODE_MASK {
            0 => Some(Mode::Copy),
            1 => Some(Mode::Sync),
            2 => Some(Mode::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Copy => "copy",
            Mode::Sync => "sync",
            Mode::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Kind of mutation carried by the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Insert = 0,
    Update = 1,
    Delete = 2,
    Command = 3,
    Noop = 4,
    Skip = 5,
}

impl Operation {
    fn from_attributes(attributes: u8) -> Option<Self> {
        match (attributes & OP_MASK) >> OP_SHIFT {
            0 => Some(Operation::Insert),
            1 => Some(Operation::Update),
            2 => Some(Operation::Delete),
            3 => Some(Operation::Command),
            4 => Some(Operation::Noop),
            5 => Some(Operation::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Command => "command",
            Operation::Noop => "noop",
            Operation::Skip => "skip",
        };
        f.write_str(name)
    }
}

// =============================================================================
// LogEntry
// =============================================================================

/// A single record in the commit log.
///
/// The offset is not part of the entry: it is assigned by the log at append
/// time and travels next to the entry when read back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogEntry {
    /// Namespace of the record, e.g. `database.table`
    pub key: Vec<u8>,
    /// Serialized record payload
    pub value: Vec<u8>,
    pub timestamp: u64,
    pub mode: Mode,
    pub op: Operation,
}

impl LogEntry {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        timestamp: u64,
        mode: Mode,
        op: Operation,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp,
            mode,
            op,
        }
    }

    /// Packs mode into bits 0-1 and the operation into bits 2-4
    pub fn attributes(&self) -> u8 {
        (self.mode as u8) | ((self.op as u8) << OP_SHIFT)
    }

    /// Size of the key/value block that follows the header
    pub fn body_size(&self) -> usize {
        LENGTH_PREFIXES + self.key.len() + self.value.len()
    }

    /// Check that the key/value block fits the 32-bit size field
    pub fn validate(&self) -> Result<()> {
        body_size_for(self.key.len(), self.value.len()).map(|_| ())
    }

    /// Total encoded length (header + body)
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body_size()
    }

    /// Encode the entry with the given offset
    ///
    /// Lengths are not checked here; entries from outside go through
    /// `validate()` first.
    ///
    /// Format: offset (8) + size (4) + timestamp (8) + attributes (1)
    ///         + key_len (4) + key + value_len (4) + value, all big-endian
    pub fn encode(&self, offset: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64(offset);
        buf.put_u32(self.body_size() as u32);
        buf.put_u64(self.timestamp);
        buf.put_u8(self.attributes());
        buf.put_u32(self.key.len() as u32);
        buf.put_slice(&self.key);
        buf.put_u32(self.value.len() as u32);
        buf.put_slice(&self.value);
        buf.freeze()
    }

    /// Rebuild an entry from its header and key/value block
    pub fn decode_body(header: &EntryHeader, mut body: &[u8]) -> Result<Self> {
        if body.len() != header.size as usize {
            return Err(XlogError::MalformedEntry(format!(
                "body is {} bytes, header declares {}",
                body.len(),
                header.size
            )));
        }
        let mode = header.mode()?;
        let op = header.op()?;

        let key = take_prefixed(&mut body, "key")?;
        let value = take_prefixed(&mut body, "value")?;
        if body.has_remaining() {
            return Err(XlogError::MalformedEntry(format!(
                "{} trailing bytes after value",
                body.remaining()
            )));
        }

        Ok(Self {
            key,
            value,
            timestamp: header.timestamp,
            mode,
            op,
        })
    }
}

/// Size field for a key and value of the given lengths
pub(crate) fn body_size_for(key_len: usize, value_len: usize) -> Result<u32> {
    let too_large = || {
        XlogError::MalformedEntry(format!(
            "key ({} bytes) and value ({} bytes) exceed the 32-bit size field",
            key_len, value_len
        ))
    };
    let size = LENGTH_PREFIXES
        .checked_add(key_len)
        .and_then(|n| n.checked_add(value_len))
        .ok_or_else(too_large)?;
    u32::try_from(size).map_err(|_| too_large())
}

/// Read one length-prefixed byte string off the front of `body`
fn take_prefixed(body: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    if body.remaining() < 4 {
        return Err(XlogError::MalformedEntry(format!("missing {} length", what)));
    }
    let len = body.get_u32() as usize;
    if body.remaining() < len {
        return Err(XlogError::MalformedEntry(format!(
            "{} length {} exceeds remaining {} bytes",
            what,
            len,
            body.remaining()
        )));
    }
    let bytes = body[..len].to_vec();
    body.advance(len);
    Ok(bytes)
}

/// Overwrite the offset of an already encoded entry
///
/// Writes the big-endian offset into bytes 0-7 and touches nothing else.
pub fn put_offset(encoded: &mut [u8], offset: u64) {
    encoded[OFFSET_POS..SIZE_POS].copy_from_slice(&offset.to_be_bytes());
}

// =============================================================================
// EntryHeader
// =============================================================================

/// The fixed 21-byte prefix of every entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub offset: u64,
    /// Length of the key/value block that follows
    pub size: u32,
    pub timestamp: u64,
    pub attributes: u8,
}

impl EntryHeader {
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            offset: (&bytes[OFFSET_POS..SIZE_POS]).get_u64(),
            size: (&bytes[SIZE_POS..TIMESTAMP_POS]).get_u32(),
            timestamp: (&bytes[TIMESTAMP_POS..ATTR_POS]).get_u64(),
            attributes: bytes[ATTR_POS],
        }
    }

    /// Bytes occupied by the whole entry on disk
    pub fn entry_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.size as u64
    }

    pub fn mode(&self) -> Result<Mode> {
        Mode::from_attributes(self.attributes).ok_or_else(|| {
            XlogError::MalformedEntry(format!("unknown mode in attributes {:#04x}", self.attributes))
        })
    }

    pub fn op(&self) -> Result<Operation> {
        Operation::from_attributes(self.attributes).ok_or_else(|| {
            XlogError::MalformedEntry(format!(
                "unknown operation in attributes {:#04x}",
                self.attributes
            ))
        })
    }

    /// Check the parts of the header that can be validated without the body
    pub fn validate(&self) -> Result<()> {
        if (self.size as usize) < LENGTH_PREFIXES {
            return Err(XlogError::MalformedEntry(format!(
                "size {} smaller than the length prefixes",
                self.size
            )));
        }
        if self.attributes & !(MODE_MASK | OP_MASK) != 0 {
            return Err(XlogError::MalformedEntry(format!(
                "reserved attribute bits set: {:#04x}",
                self.attributes
            )));
        }
        self.mode()?;
        self.op()?;
        Ok(())
    }
}

// =============================================================================
// Stream Decoding
// =============================================================================

/// Read until `buf` is full or the stream ends; returns the bytes read
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decode the next entry from a stream positioned at an entry boundary
///
/// Returns:
/// - `Ok(Some((offset, entry)))`: a complete entry
/// - `Ok(None)`: the stream ran out of bytes (no more entries yet)
/// - `Err(_)`: the bytes are present but do not form a valid entry
pub fn read_entry<R: Read + ?Sized>(reader: &mut R) -> Result<Option<(u64, LogEntry)>> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    if read_full(reader, &mut header_bytes)? < HEADER_SIZE {
        return Ok(None);
    }
    let header = EntryHeader::decode(&header_bytes);
    header.validate()?;

    let mut body = vec![0u8; header.size as usize];
    if read_full(reader, &mut body)? < body.len() {
        return Ok(None);
    }

    let entry = LogEntry::decode_body(&header, &body)?;
    Ok(Some((header.offset, entry)))
}
