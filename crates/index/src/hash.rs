//! Key hashing for callers of [`HashTable`](crate::HashTable).
//!
//! The table picks a head bucket from the low bits of the key as given, so
//! keys with poor low-bit entropy (sequential ids shifted left, aligned
//! offsets) pile into a few chains. These helpers spread keys first.

use xxhash_rust::xxh3::xxh3_64;

/// Hash arbitrary bytes (an indexed field value, a primary key) to a key
#[inline]
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Hash a string to a key
#[inline]
pub fn hash_str(s: &str) -> u64 {
    hash_bytes(s.as_bytes())
}

/// Cheap integer smear mixing high bits into low bits
#[inline]
pub fn smear(key: u64) -> u64 {
    let key = key ^ (key >> 4);
    let key = (key ^ 0xdead_beef).wrapping_add(key << 5);
    key ^ (key >> 11)
}
