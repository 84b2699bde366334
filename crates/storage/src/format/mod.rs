//! On-disk byte formats for collection and hash files.
//!
//! Everything here is a pure function over byte slices. Locking, growth and
//! scanning live with the structures that own the files.
//!
//! # Module Structure
//!
//! - `varint`: base-128 varints in fixed 10-byte slots
//! - `record`: collection record header, padding and scan resynchronization
//! - `bucket`: hash bucket geometry, entries and chain links

pub mod bucket;
pub mod record;
pub mod varint;

pub use bucket::{
    decode_entry, decode_link, encode_entry, encode_link, BucketLayout, Entry,
    BUCKET_HEADER_SIZE, ENTRY_INVALID, ENTRY_SIZE, ENTRY_VALID,
};
pub use record::{
    encode_header, end_of_records, next_record_boundary, parse_header, trim_padding, HeaderFault,
    RecordHeader, INVALID, PADDING, RECORD_HEADER_SIZE, VALID,
};
pub use varint::{decode_uvarint, encode_uvarint, read_slot, write_slot, VarintError, SLOT_SIZE};
