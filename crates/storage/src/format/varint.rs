//! Base-128 unsigned varints in fixed 10-byte slots.
//!
//! Every integer stored on disk (record room, bucket links, entry keys and
//! values) uses the standard little-endian base-128 encoding: seven value bits
//! per byte, high bit set on every byte but the last. A `u64` needs at most
//! ten bytes, so each field reserves a [`SLOT_SIZE`] slot and zero-fills the
//! bytes after the terminator.
//!
//! ## Slot Validation
//!
//! Because writers always zero-fill a slot before encoding, a well-formed slot
//! has exactly one shape: a minimal encoding followed by zeros. [`read_slot`]
//! rejects anything else. Scans rely on this to tell a real header from
//! arbitrary payload bytes while resynchronizing after corruption.

use thiserror::Error;

/// Bytes reserved for one varint field
pub const SLOT_SIZE: usize = 10;

/// Varint decode failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarintError {
    /// Input ended before the terminating byte
    #[error("varint truncated")]
    Truncated,
    /// Encoded value does not fit in 64 bits
    #[error("varint overflows u64")]
    Overflow,
    /// Non-minimal encoding or non-zero bytes after the terminator
    #[error("varint slot is not canonical")]
    NonCanonical,
}

/// Encoded length of `value`
#[inline]
pub fn uvarint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encode `value` at the start of `buf`, returning bytes written.
///
/// `buf` must hold at least [`uvarint_len`] bytes.
#[inline]
pub fn encode_uvarint(mut value: u64, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a varint from the start of `buf`, returning `(value, bytes_read)`.
pub fn decode_uvarint(buf: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate().take(SLOT_SIZE) {
        if i == SLOT_SIZE - 1 && byte > 1 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte < 0x80 {
            if byte == 0 && i > 0 {
                return Err(VarintError::NonCanonical);
            }
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= SLOT_SIZE {
        Err(VarintError::Overflow)
    } else {
        Err(VarintError::Truncated)
    }
}

/// Zero-fill `slot` and encode `value` into it
#[inline]
pub fn write_slot(slot: &mut [u8], value: u64) {
    slot[..SLOT_SIZE].fill(0);
    encode_uvarint(value, slot);
}

/// Encode `value` into a fresh slot
#[inline]
pub fn slot_bytes(value: u64) -> [u8; SLOT_SIZE] {
    let mut slot = [0u8; SLOT_SIZE];
    encode_uvarint(value, &mut slot);
    slot
}

/// Decode a full slot, requiring zeros after the terminator
pub fn read_slot(slot: &[u8]) -> Result<u64, VarintError> {
    if slot.len() < SLOT_SIZE {
        return Err(VarintError::Truncated);
    }
    let (value, len) = decode_uvarint(&slot[..SLOT_SIZE])?;
    if slot[len..SLOT_SIZE].iter().any(|&b| b != 0) {
        return Err(VarintError::NonCanonical);
    }
    Ok(value)
}
