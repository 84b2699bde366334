//! Hash bucket layout.
//!
//! ```text
//! bucket n at offset n * bucket_size:
//! +--------------------+---------+---------+-----+---------+
//! | next bucket (slot) | entry 0 | entry 1 | ... | entry k |
//! | 10 bytes           | 21 B    | 21 B    |     | 21 B    |
//! +--------------------+---------+---------+-----+---------+
//!
//! entry:
//! +----------+------------------+------------------+
//! | validity | key (slot)       | value (slot)     |
//! | 1 byte   | 10 bytes         | 10 bytes         |
//! +----------+------------------+------------------+
//! ```
//!
//! A next-bucket number of zero terminates the chain. An entry with
//! validity, key and value all zero was never written.

use super::varint::{read_slot, slot_bytes, VarintError, SLOT_SIZE};

/// Bytes of the next-bucket link at the start of a bucket
pub const BUCKET_HEADER_SIZE: u64 = SLOT_SIZE as u64;

/// Bytes of one entry
pub const ENTRY_SIZE: u64 = 1 + 2 * SLOT_SIZE as u64;

/// Validity byte of a live entry
pub const ENTRY_VALID: u8 = 1;

/// Validity byte of a removed or never-written entry
pub const ENTRY_INVALID: u8 = 0;

/// Offset arithmetic for a hash file with fixed bucket geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLayout {
    hash_bits: u32,
    per_bucket: u64,
    bucket_size: u64,
}

impl BucketLayout {
    /// Layout for `2^hash_bits` head buckets of `per_bucket` entries
    pub fn new(hash_bits: u32, per_bucket: u64) -> Self {
        BucketLayout {
            hash_bits,
            per_bucket,
            bucket_size: BUCKET_HEADER_SIZE + per_bucket * ENTRY_SIZE,
        }
    }

    /// Bytes per bucket
    #[inline]
    pub fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    /// Entry slots per bucket
    #[inline]
    pub fn per_bucket(&self) -> u64 {
        self.per_bucket
    }

    /// Number of low key bits used to pick a head bucket
    #[inline]
    pub fn hash_bits(&self) -> u32 {
        self.hash_bits
    }

    /// Number of head buckets
    #[inline]
    pub fn initial_buckets(&self) -> u64 {
        1u64 << self.hash_bits
    }

    /// Head bucket of `key`: its low `hash_bits` bits
    #[inline]
    pub fn hash_key(&self, key: u64) -> u64 {
        key & (self.initial_buckets() - 1)
    }

    /// File offset of bucket `bucket`
    #[inline]
    pub fn bucket_offset(&self, bucket: u64) -> u64 {
        bucket * self.bucket_size
    }

    /// File offset of entry `slot` within bucket `bucket`
    #[inline]
    pub fn entry_offset(&self, bucket: u64, slot: u64) -> u64 {
        self.bucket_offset(bucket) + BUCKET_HEADER_SIZE + slot * ENTRY_SIZE
    }
}

/// A decoded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// True when the validity byte is [`ENTRY_VALID`]
    pub valid: bool,
    /// Stored key
    pub key: u64,
    /// Stored value
    pub value: u64,
}

impl Entry {
    /// True for a slot that was never written
    #[inline]
    pub fn is_unused(&self) -> bool {
        !self.valid && self.key == 0 && self.value == 0
    }
}

/// Encode a live entry, zero-filling both slots
pub fn encode_entry(key: u64, value: u64) -> [u8; ENTRY_SIZE as usize] {
    let mut entry = [0u8; ENTRY_SIZE as usize];
    entry[0] = ENTRY_VALID;
    entry[1..1 + SLOT_SIZE].copy_from_slice(&slot_bytes(key));
    entry[1 + SLOT_SIZE..].copy_from_slice(&slot_bytes(value));
    entry
}

/// Decode an entry from at least [`ENTRY_SIZE`] bytes
pub fn decode_entry(bytes: &[u8]) -> Result<Entry, VarintError> {
    if (bytes.len() as u64) < ENTRY_SIZE {
        return Err(VarintError::Truncated);
    }
    Ok(Entry {
        valid: bytes[0] == ENTRY_VALID,
        key: read_slot(&bytes[1..1 + SLOT_SIZE])?,
        value: read_slot(&bytes[1 + SLOT_SIZE..ENTRY_SIZE as usize])?,
    })
}

/// Decode a next-bucket link
pub fn decode_link(bytes: &[u8]) -> Result<u64, VarintError> {
    read_slot(bytes)
}

/// Encode a next-bucket link
pub fn encode_link(next: u64) -> [u8; SLOT_SIZE] {
    slot_bytes(next)
}
