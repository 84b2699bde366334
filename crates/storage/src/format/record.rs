//! Collection record layout.
//!
//! ```text
//! +----------+----------------+-----------------+--------------------+
//! | validity | room (varint)  | payload         | padding (0x20)     |
//! | 1 byte   | 10-byte slot   | len bytes       | room - len bytes   |
//! +----------+----------------+-----------------+--------------------+
//! ```
//!
//! A record's offset is its identifier. Padding is ASCII space, never zero,
//! so the last byte of every record is non-zero and the used/free boundary
//! of a collection file can be found by looking for zero runs.

use super::varint::{read_slot, slot_bytes, VarintError, SLOT_SIZE};
use thiserror::Error;

/// Validity byte of a live record
pub const VALID: u8 = 1;

/// Validity byte of a deleted record
pub const INVALID: u8 = 0;

/// Header bytes before the payload: validity + room slot
pub const RECORD_HEADER_SIZE: usize = 1 + SLOT_SIZE;

/// Byte filling unused room
pub const PADDING: u8 = b' ';

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// True when the validity byte is [`VALID`]
    pub valid: bool,
    /// Bytes reserved for payload and padding
    pub room: u64,
}

impl RecordHeader {
    /// Total bytes the record occupies, header included
    #[inline]
    pub fn span(&self) -> usize {
        RECORD_HEADER_SIZE + self.room as usize
    }
}

/// Why a header could not be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderFault {
    /// Header would extend past the used region
    #[error("header extends past the used region")]
    Truncated,
    /// Validity byte is neither VALID nor INVALID
    #[error("validity byte {0:#04x} is neither valid nor invalid")]
    BadValidity(u8),
    /// Room slot does not hold a canonical varint
    #[error("room is unreadable: {0}")]
    BadRoom(#[from] VarintError),
    /// Room exceeds the per-record maximum
    #[error("room {room} exceeds maximum {max}")]
    RoomTooLarge {
        /// Decoded room
        room: u64,
        /// Configured maximum
        max: u64,
    },
    /// Header is fine but the body runs past the used region
    #[error("record body of {room} bytes extends past the used region")]
    Overrun {
        /// Decoded room
        room: u64,
    },
}

/// Encode a header
pub fn encode_header(valid: bool, room: u64) -> [u8; RECORD_HEADER_SIZE] {
    let mut header = [0u8; RECORD_HEADER_SIZE];
    header[0] = if valid { VALID } else { INVALID };
    header[1..].copy_from_slice(&slot_bytes(room));
    header
}

/// Parse the header at `at` within the used region `bytes`.
///
/// Succeeds only when the whole record, body included, lies inside `bytes`.
pub fn parse_header(bytes: &[u8], at: usize, max_room: u64) -> Result<RecordHeader, HeaderFault> {
    let header_end = at
        .checked_add(RECORD_HEADER_SIZE)
        .filter(|end| *end <= bytes.len())
        .ok_or(HeaderFault::Truncated)?;

    let valid = match bytes[at] {
        VALID => true,
        INVALID => false,
        other => return Err(HeaderFault::BadValidity(other)),
    };
    let room = read_slot(&bytes[at + 1..header_end])?;
    if room > max_room {
        return Err(HeaderFault::RoomTooLarge { room, max: max_room });
    }
    if (bytes.len() - header_end) < room as usize {
        return Err(HeaderFault::Overrun { room });
    }
    Ok(RecordHeader { valid, room })
}

/// Find the next offset at or after `from` where a well-formed record starts.
///
/// Used to resume a scan after a corrupt header. Steps forward one byte at a
/// time and returns the first offset whose header parses cleanly, or `None`
/// when no such offset remains in `bytes`.
pub fn next_record_boundary(bytes: &[u8], from: usize, max_room: u64) -> Option<usize> {
    (from..bytes.len()).find(|&at| {
        matches!(bytes[at], VALID | INVALID) && parse_header(bytes, at, max_room).is_ok()
    })
}

/// Offset where the record region of `bytes` ends.
///
/// Walks headers from offset 0 and stops at the first all-zero header (free
/// space never holds a header, and every written header has a non-zero room)
/// or at the end of `bytes`. A malformed header stops the walk with the
/// offset reached and the fault.
pub fn end_of_records(bytes: &[u8], max_room: u64) -> Result<usize, (usize, HeaderFault)> {
    let mut at = 0;
    while at < bytes.len() {
        let header_end = (at + RECORD_HEADER_SIZE).min(bytes.len());
        if bytes[at..header_end].iter().all(|&b| b == 0) {
            return Ok(at);
        }
        let header = parse_header(bytes, at, max_room).map_err(|fault| (at, fault))?;
        at += header.span();
    }
    Ok(at)
}

/// Strip trailing padding from a record's room
pub fn trim_padding(room: &[u8]) -> &[u8] {
    let end = room
        .iter()
        .rposition(|&b| b != PADDING)
        .map_or(0, |last| last + 1);
    &room[..end]
}
